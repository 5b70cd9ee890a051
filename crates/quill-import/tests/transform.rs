use std::path::Path;

use pretty_assertions::assert_eq;
use quill_cache::FilesCache;
use quill_import::{
    ImportTransformer, MAX_IMPORT_DEPTH, MemoryLoader, TransformOptions, TransformOutput,
};

const WHITELIST: &[String] = &[];

fn options(for_preview: bool) -> TransformOptions<'static> {
    TransformOptions {
        file_directory_path: Path::new("/project/docs"),
        project_directory_path: Path::new("/project"),
        for_preview,
        protocols_whitelist: WHITELIST,
        is_nested_import: false,
        image_directory_path: Path::new("/project/assets"),
        image_link_base: "/assets",
        image_file_prefix: "",
    }
}

fn run(loader: MemoryLoader, text: &str, for_preview: bool) -> TransformOutput {
    ImportTransformer::with_loader(loader).transform(text, &options(for_preview), &mut FilesCache::new())
}

#[test]
fn test_nested_markdown_headings_concatenated_without_anchors() {
    let loader = MemoryLoader::new()
        .with_file("/project/docs/sub.md", "# Intro\n## Intro\ntext\n```sh\nls\n```\n");
    let out = run(loader, "# Intro\n@import \"sub.md\"\n# After\n", true);

    let ids: Vec<_> = out.headings.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["intro", "intro", "intro-1", "after"]);

    assert_eq!(
        out.output,
        "<p data-line=\"0\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n# Intro {#intro}\n\
         <p data-line=\"1\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n\
         # Intro {#intro}\n## Intro {#intro-1}\ntext\n```sh\nls\n```\n\
         <p data-line=\"2\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n# After {#after}\n"
    );
}

#[test]
fn test_nested_setext_headings_recorded() {
    let loader = MemoryLoader::new().with_file("/project/docs/sub.md", "Part\n----\nbody\n");
    let out = run(loader, "Top\n===\n@import \"sub.md\"\n", false);

    let ids: Vec<_> = out.headings.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["top", "part"]);
    assert_eq!(out.output, "# Top {#top}\n## Part {#part}\nbody\n");
}

#[test]
fn test_nested_relative_imports_rebase() {
    let loader = MemoryLoader::new()
        .with_file("/project/docs/part/a.md", "@import \"b.md\"\n")
        .with_file("/project/docs/part/b.md", "B\n");
    let out = run(loader, "@import \"part/a.md\"\n", false);
    assert_eq!(out.output, "B\n");
}

#[test]
fn test_rooted_import_uses_project_directory() {
    let loader = MemoryLoader::new().with_file("/project/shared.md", "shared\n");
    let out = run(loader, "@import \"/shared.md\"\n", false);
    assert_eq!(out.output, "shared\n");
}

#[test]
fn test_cycle_is_inline_error() {
    let loader = MemoryLoader::new()
        .with_file("/project/docs/a.md", "A\n@import \"b.md\"\n")
        .with_file("/project/docs/b.md", "B\n@import \"a.md\"\n");
    let out = run(loader, "@import \"a.md\"\n", false);

    assert!(out.output.starts_with("A\nB\n<pre class=\"quill-error\""));
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].contains("circular import"));
}

#[test]
fn test_depth_is_bounded() {
    let loader = MemoryLoader::new();
    for i in 0..=MAX_IMPORT_DEPTH + 1 {
        loader.insert(format!("/project/docs/{i}.md"), format!("@import \"{}.md\"\n", i + 1));
    }
    let out = run(loader, "@import \"0.md\"\n", false);
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].contains("nested deeper"));
}

#[test]
fn test_missing_import_is_per_directive() {
    let loader = MemoryLoader::new().with_file("/project/docs/ok.md", "ok\n");
    let out = run(loader, "@import \"nope.md\"\n@import \"ok.md\"\n", false);
    assert!(out.output.contains("file not found: /project/docs/nope.md"));
    assert!(out.output.ends_with("ok\n"));
    assert_eq!(out.warnings.len(), 1);
}

#[test]
fn test_files_cache_shared_across_imports() {
    let loader = MemoryLoader::new().with_file("/project/docs/x.py", "print(1)\n");
    let transformer = ImportTransformer::with_loader(loader);
    let mut cache = FilesCache::new();
    transformer.transform(
        "@import \"x.py\"\n@import \"x.py\"\n",
        &options(false),
        &mut cache,
    );
    assert_eq!(transformer.loader().loads(), ["/project/docs/x.py"]);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_image_imports() {
    let out = run(
        MemoryLoader::new(),
        "@import \"img/a.png\"\n@import \"b.jpg\" {width=\"100\" alt=\"B\"}\n",
        false,
    );
    assert_eq!(
        out.output,
        "![](<img/a.png>)\n<img src=\"b.jpg\" alt=\"B\" width=\"100\">\n"
    );
}

#[test]
fn test_preview_image_is_absolute_and_cache_busted() {
    let out = run(MemoryLoader::new(), "@import \"a.png\"\n", true);
    let line = out.output.lines().last().unwrap();
    assert!(line.starts_with("![](</project/docs/a.png?"));
    assert_eq!(line.len(), "![](</project/docs/a.png?>)".len() + 8);
}

#[test]
fn test_code_import_with_line_range() {
    let loader = MemoryLoader::new().with_file("/project/docs/lib.rs", "a\nb\nc\nd\n");
    let out = run(loader, "@import \"lib.rs\" {line_begin=2 line_end=4}\n", false);
    assert_eq!(out.output, "```rs\nb\nc\n```\n");
}

#[test]
fn test_executable_import_gets_id_and_offset() {
    let loader = MemoryLoader::new().with_file("/project/docs/run.py", "print(1)\n");
    let out = run(
        loader,
        "```sh {cmd}\nls\n```\n@import \"run.py\" {cmd=true}\n",
        false,
    );
    let fence = out.output.lines().nth(3).unwrap();
    assert!(fence.starts_with("```py {cmd=true code_chunk_offset=1 id=\""));
}

#[test]
fn test_markdown_as_code_block() {
    let loader = MemoryLoader::new().with_file("/project/docs/a.md", "# A\n");
    let out = run(loader, "@import \"a.md\" {code_block=true}\n", false);
    assert_eq!(out.output, "```md\n# A\n```\n");
    assert!(out.headings.is_empty());
}

#[test]
fn test_diagram_import_keeps_options() {
    let loader = MemoryLoader::new().with_file("/project/docs/flow.puml", "A -> B\n");
    let out = run(loader, "@import \"flow.puml\" {align=\"center\"}\n", false);
    assert_eq!(out.output, "```puml {align=\"center\"}\nA -> B\n```\n");
}

#[test]
fn test_csv_import() {
    let loader = MemoryLoader::new().with_file("/project/docs/t.csv", "a,b\n1,2\n");
    let out = run(loader, "@import \"t.csv\"\n", false);
    assert_eq!(out.output, "\n| a | b |\n| --- | --- |\n| 1 | 2 |\n\n");
}

#[test]
fn test_stylesheets_and_scripts() {
    let loader = MemoryLoader::new()
        .with_file("/project/docs/s.scss", "$c: red;\np { color: $c; }\n")
        .with_file("/project/docs/a.js", "init();\n");
    let text = "@import \"s.scss\"\n@import \"a.js\"\n";

    let export = run(loader, text, false);
    assert!(export.output.contains("<style>\np {\n  color: red;\n}\n</style>"));
    assert!(export.output.contains("<script>\ninit();\n</script>"));

    let preview = run(MemoryLoader::new(), text, true);
    assert_eq!(
        preview.js_and_css_files,
        ["/project/docs/s.scss", "/project/docs/a.js"]
    );
    assert!(!preview.output.contains("<style>"));
}

#[test]
fn test_less_inlined_with_warning() {
    let loader = MemoryLoader::new()
        .with_file("/project/docs/t.less", "p { color: red; }\n")
        .with_file("/project/docs/t.css", "a { color: blue; }\n");
    let out = run(loader, "@import \"t.less\"\n@import \"t.css\"\n", false);

    assert!(out.output.starts_with("<style>\np { color: red; }\n</style>\n\n"));
    assert!(out.output.contains("<style>\na { color: blue; }\n</style>"));
    assert_eq!(out.warnings, ["/project/docs/t.less: LESS is not compiled; inlined as plain CSS"]);
}

#[test]
fn test_toc_import_becomes_hidden_chunk() {
    let out = run(MemoryLoader::new(), "@import \"[TOC]\" {depth_to=2}\n", false);
    assert_eq!(
        out.output,
        "```text {cmd=\"toc\" depth_to=2 hide=true}\n```\n"
    );
}

#[test]
fn test_comment_form_import() {
    let loader = MemoryLoader::new().with_file("/project/docs/p.html", "<b>hi</b>");
    let out = run(loader, "<!-- @import \"p.html\" -->\n", false);
    assert_eq!(out.output, "<b>hi</b>\n");
}

#[test]
fn test_whitelisted_protocol_unchanged() {
    let whitelist = vec!["https://".to_owned()];
    let loader = MemoryLoader::new().with_file("https://example.com/a.md", "remote\n");
    let out = ImportTransformer::with_loader(loader).transform(
        "@import \"https://example.com/a.md\"\n",
        &TransformOptions {
            protocols_whitelist: &whitelist,
            ..options(false)
        },
        &mut FilesCache::new(),
    );
    assert_eq!(out.output, "remote\n");
}

#[test]
fn test_missing_pdf() {
    let out = run(MemoryLoader::new(), "@import \"slides.pdf\"\n", false);
    assert!(out.warnings[0].contains("file not found"));
}

#[test]
fn test_no_imports_is_identity() {
    let text = "Para one.\n\n> quote\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n~~~\n@import \"x.md\"\n~~~\n";
    let out = run(MemoryLoader::new(), text, false);
    assert_eq!(out.output, text);
}
