//! One-shot external tools: Graphviz and the SVG rasterizer.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::DiagramError;

/// Run `program` with `args`, feeding `input` on stdin, and return stdout.
///
/// A non-zero exit is a failure carrying the tool's stderr.
pub(crate) fn run_tool(
    program: &str,
    args: &[&str],
    input: &[u8],
    cwd: Option<&Path>,
) -> Result<Vec<u8>, DiagramError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| DiagramError::spawn(program, e))?;

    // Tools may fill stdout before draining stdin.
    let mut stdin = child.stdin.take();
    let output = std::thread::scope(|scope| {
        scope.spawn(|| {
            if let Some(stdin) = stdin.as_mut() {
                let _ = stdin.write_all(input);
            }
            drop(stdin.take());
        });
        child.wait_with_output()
    })?;

    if !output.status.success() {
        return Err(DiagramError::Failed {
            tool: program.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    tracing::debug!(tool = program, bytes = output.stdout.len(), "Tool finished");
    Ok(output.stdout)
}

/// Render a Graphviz source to SVG with `dot -Tsvg`.
pub fn render_dot(dot: &str, source: &str, cwd: Option<&Path>) -> Result<String, DiagramError> {
    let stdout = run_tool(dot, &["-Tsvg"], source.as_bytes(), cwd)?;
    svg_from_bytes(&stdout)
}

/// Rasterize SVG markup to a PNG file at `output`.
pub fn svg_to_png(raster_tool: &str, svg: &str, output: &Path) -> Result<(), DiagramError> {
    let png = run_tool(raster_tool, &["-f", "png"], svg.as_bytes(), None)?;
    if png.is_empty() {
        return Err(DiagramError::InvalidOutput(format!(
            "{raster_tool} produced no output"
        )));
    }
    std::fs::write(output, png)?;
    Ok(())
}

/// Decode tool output and drop anything before the `<svg` element.
pub(crate) fn svg_from_bytes(bytes: &[u8]) -> Result<String, DiagramError> {
    let text = String::from_utf8_lossy(bytes);
    let start = text
        .find("<svg")
        .ok_or_else(|| DiagramError::InvalidOutput("no <svg> element in output".to_owned()))?;
    Ok(text[start..].trim_end().to_owned())
}
