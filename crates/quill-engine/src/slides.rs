//! Slide segmentation.
//!
//! The renderer leaves a boundary span wherever the source had a
//! `<!-- slide -->` comment. The HTML between two boundaries is one slide;
//! content before the first boundary is kept unwrapped.

use std::fmt::Write;
use std::sync::LazyLock;

use quill_import::SlideConfig;
use quill_renderer::{Attributes, escape_html};
use regex::Regex;

static SLIDE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="quill-slide" data-index="(\d+)"></span>\n?"#).unwrap()
});

/// Background keys turned into inline CSS in preview.
const BACKGROUND_STYLES: &[(&str, &str)] = &[
    ("data-background-image", "background-image"),
    ("data-background-color", "background-color"),
    ("data-background-size", "background-size"),
    ("data-background-position", "background-position"),
    ("data-background-repeat", "background-repeat"),
];

struct Slide<'a> {
    config: Option<&'a SlideConfig>,
    offset: usize,
    html: &'a str,
}

/// Split `html` at boundary spans.
fn split<'a>(html: &'a str, configs: &'a [SlideConfig]) -> (&'a str, Vec<Slide<'a>>) {
    let mut boundaries = SLIDE_SPAN.captures_iter(html).peekable();
    let Some(first) = boundaries.peek() else {
        return (html, Vec::new());
    };
    let Some(first_match) = first.get(0) else {
        return (html, Vec::new());
    };
    let leading = &html[..first_match.start()];

    let mut slides = Vec::new();
    while let Some(caps) = boundaries.next() {
        let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = boundaries
            .peek()
            .and_then(|next| next.get(0))
            .map_or(html.len(), |m| m.start());
        let offset = index.as_str().parse().unwrap_or(slides.len());
        slides.push(Slide {
            config: configs.get(offset),
            offset,
            html: &html[whole.end()..end],
        });
    }
    (leading, slides)
}

/// Preview layout: one positioned `div.slide` per slide.
pub(crate) fn preview_slides(html: &str, configs: &[SlideConfig]) -> String {
    let (leading, slides) = split(html, configs);
    if slides.is_empty() {
        return html.to_owned();
    }

    let mut out = String::with_capacity(html.len() + slides.len() * 96);
    out.push_str(leading);
    for slide in slides {
        let empty = Attributes::new();
        let (line, attrs) = slide
            .config
            .map_or((0, &empty), |c| (c.line_no, &c.attributes));

        let mut class = String::from("slide");
        if let Some(extra) = attrs.get_str("class") {
            class.push(' ');
            class.push_str(&extra);
        }
        write!(
            out,
            r#"<div class="{}" data-line="{line}" data-offset="{}""#,
            escape_html(&class),
            slide.offset
        )
        .unwrap();
        if let Some(id) = attrs.get_str("id") {
            write!(out, r#" id="{}""#, escape_html(&id)).unwrap();
        }

        let style = background_style(attrs);
        if !style.is_empty() {
            write!(out, r#" style="{}""#, escape_html(&style)).unwrap();
        }
        out.push('>');

        if let Some(video) = attrs.get_str("data-background-video") {
            write!(
                out,
                r#"<video class="slide-background" muted autoplay loop><source src="{}"></video>"#,
                escape_html(&video)
            )
            .unwrap();
        }
        if let Some(iframe) = attrs.get_str("data-background-iframe") {
            write!(
                out,
                r#"<iframe class="slide-background" src="{}"></iframe>"#,
                escape_html(&iframe)
            )
            .unwrap();
        }
        write!(out, r#"<section>{}</section></div>"#, slide.html).unwrap();
        out.push('\n');
    }
    out
}

fn background_style(attrs: &Attributes) -> String {
    let mut style = String::new();
    for (key, property) in BACKGROUND_STYLES {
        let Some(value) = attrs.get_str(key) else {
            continue;
        };
        if *key == "data-background-image" {
            write!(style, "{property}: url('{value}');").unwrap();
        } else {
            write!(style, "{property}: {value};").unwrap();
        }
    }
    style
}

/// Export layout: `<section>` per slide, vertical slides nested under the
/// preceding horizontal one.
pub(crate) fn export_slides(html: &str, configs: &[SlideConfig]) -> String {
    let (leading, slides) = split(html, configs);
    if slides.is_empty() {
        return html.to_owned();
    }

    let mut groups: Vec<Vec<&Slide<'_>>> = Vec::new();
    for slide in &slides {
        let vertical = slide.config.is_some_and(|c| c.attributes.flag("vertical"));
        match groups.last_mut() {
            Some(group) if vertical => group.push(slide),
            _ => groups.push(vec![slide]),
        }
    }

    let mut out = String::with_capacity(html.len() + slides.len() * 32);
    out.push_str(leading);
    for group in groups {
        let nested = group.len() > 1;
        if nested {
            out.push_str("<section>");
        }
        for slide in group {
            out.push_str("<section");
            if let Some(config) = slide.config {
                for (key, value) in config.attributes.iter() {
                    if key == "vertical" {
                        continue;
                    }
                    let value = config.attributes.get_str(key).unwrap_or_else(|| value.to_string());
                    write!(out, r#" {key}="{}""#, escape_html(&value)).unwrap();
                }
            }
            write!(out, ">{}</section>", slide.html).unwrap();
        }
        if nested {
            out.push_str("</section>");
        }
        out.push('\n');
    }
    out
}
