//! `PlantUML` command line and source preparation.

use std::path::PathBuf;

/// How to start a persistent `PlantUML` process in `-pipe` mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantUmlCommand {
    java: String,
    jar: Option<PathBuf>,
}

impl Default for PlantUmlCommand {
    fn default() -> Self {
        Self {
            java: "java".to_owned(),
            jar: None,
        }
    }
}

impl PlantUmlCommand {
    /// Run `jar` with the given Java executable.
    #[must_use]
    pub fn jar(java: impl Into<String>, jar: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: Some(jar.into()),
        }
    }

    /// Use a `plantuml` launcher found on `PATH`.
    #[must_use]
    pub fn launcher() -> Self {
        Self::default()
    }

    /// Program and arguments for the pipe-mode process.
    #[must_use]
    pub fn to_task_command(&self) -> TaskCommand {
        const PIPE_ARGS: [&str; 4] = ["-pipe", "-tsvg", "-charset", "UTF-8"];
        match &self.jar {
            Some(jar) => {
                let mut args = vec![
                    "-Djava.awt.headless=true".to_owned(),
                    "-jar".to_owned(),
                    jar.display().to_string(),
                ];
                args.extend(PIPE_ARGS.iter().map(|a| (*a).to_owned()));
                TaskCommand {
                    program: self.java.clone(),
                    args,
                }
            }
            None => TaskCommand {
                program: "plantuml".to_owned(),
                args: PIPE_ARGS.iter().map(|a| (*a).to_owned()).collect(),
            },
        }
    }
}

/// Program and arguments for a pooled process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    /// Executable.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl TaskCommand {
    /// Build from a program and arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }
}

/// Wrap a diagram in `@startuml`/`@enduml` unless it already has a start tag.
///
/// Sources that open with another `@start…` directive (`@startmindmap`,
/// `@startgantt`, …) are left alone.
#[must_use]
pub fn prepare_source(source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.starts_with("@start") {
        let mut out = trimmed.to_owned();
        out.push('\n');
        return out;
    }
    format!("@startuml\n{trimmed}\n@enduml\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_jar_command() {
        let cmd = PlantUmlCommand::jar("/opt/java/bin/java", "/opt/plantuml.jar").to_task_command();
        assert_eq!(cmd.program, "/opt/java/bin/java");
        assert_eq!(
            cmd.args,
            [
                "-Djava.awt.headless=true",
                "-jar",
                "/opt/plantuml.jar",
                "-pipe",
                "-tsvg",
                "-charset",
                "UTF-8"
            ]
        );
    }

    #[test]
    fn test_launcher_command() {
        let cmd = PlantUmlCommand::launcher().to_task_command();
        assert_eq!(cmd.program, "plantuml");
        assert_eq!(cmd.args[0], "-pipe");
    }

    #[test]
    fn test_prepare_wraps_bare_source() {
        assert_eq!(prepare_source("Alice -> Bob\n"), "@startuml\nAlice -> Bob\n@enduml\n");
    }

    #[test]
    fn test_prepare_keeps_existing_tags() {
        assert_eq!(
            prepare_source("@startmindmap\n* root\n@endmindmap"),
            "@startmindmap\n* root\n@endmindmap\n"
        );
    }
}
