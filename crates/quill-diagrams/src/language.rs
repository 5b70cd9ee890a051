//! Diagram grammars recognized in fences and imports.

/// Supported diagram languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramLanguage {
    PlantUml,
    GraphViz,
    Mermaid,
    WaveDrom,
    Vega,
    VegaLite,
    Ditaa,
    BlockDiag,
    SeqDiag,
    ActDiag,
    NwDiag,
    Erd,
    Nomnoml,
    Svgbob,
}

/// How a diagram language gets rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRoute {
    /// Persistent `PlantUML` process.
    PlantUml,
    /// One-shot `dot` invocation.
    Dot,
    /// Kroki HTTP service (when configured).
    Kroki,
    /// Rendered in the browser; left for the markdown renderer.
    Client,
}

impl DiagramLanguage {
    /// Parse language from a fence info string.
    ///
    /// Accepts `kroki-` prefixed names as well (`kroki-mermaid`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let lang = s.strip_prefix("kroki-").unwrap_or(s);

        match lang.to_ascii_lowercase().as_str() {
            "puml" | "plantuml" => Some(Self::PlantUml),
            "dot" | "viz" | "graphviz" => Some(Self::GraphViz),
            "mermaid" => Some(Self::Mermaid),
            "wavedrom" => Some(Self::WaveDrom),
            "vega" => Some(Self::Vega),
            "vega-lite" | "vegalite" => Some(Self::VegaLite),
            "ditaa" => Some(Self::Ditaa),
            "blockdiag" => Some(Self::BlockDiag),
            "seqdiag" => Some(Self::SeqDiag),
            "actdiag" => Some(Self::ActDiag),
            "nwdiag" => Some(Self::NwDiag),
            "erd" => Some(Self::Erd),
            "nomnoml" => Some(Self::Nomnoml),
            "svgbob" => Some(Self::Svgbob),
            _ => None,
        }
    }

    /// Language for an imported file extension (without the dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "puml" | "plantuml" | "pu" | "iuml" | "wsd" => Some(Self::PlantUml),
            "dot" | "gv" | "viz" => Some(Self::GraphViz),
            "mermaid" | "mmd" => Some(Self::Mermaid),
            "wavedrom" => Some(Self::WaveDrom),
            "vega" => Some(Self::Vega),
            "vl" => Some(Self::VegaLite),
            "ditaa" => Some(Self::Ditaa),
            _ => None,
        }
    }

    /// Fence language emitted for this diagram.
    #[must_use]
    pub fn fence_language(self) -> &'static str {
        match self {
            Self::PlantUml => "puml",
            Self::GraphViz => "dot",
            Self::VegaLite => "vega-lite",
            other => other.kroki_endpoint(),
        }
    }

    /// Kroki endpoint name for this diagram type.
    #[must_use]
    pub fn kroki_endpoint(self) -> &'static str {
        match self {
            Self::PlantUml => "plantuml",
            Self::GraphViz => "graphviz",
            Self::Mermaid => "mermaid",
            Self::WaveDrom => "wavedrom",
            Self::Vega => "vega",
            Self::VegaLite => "vegalite",
            Self::Ditaa => "ditaa",
            Self::BlockDiag => "blockdiag",
            Self::SeqDiag => "seqdiag",
            Self::ActDiag => "actdiag",
            Self::NwDiag => "nwdiag",
            Self::Erd => "erd",
            Self::Nomnoml => "nomnoml",
            Self::Svgbob => "svgbob",
        }
    }

    /// Choose a renderer. Local tools win; Kroki covers the rest when available.
    #[must_use]
    pub fn route(self, kroki_available: bool) -> RenderRoute {
        match self {
            Self::PlantUml => RenderRoute::PlantUml,
            Self::GraphViz => RenderRoute::Dot,
            _ if kroki_available => RenderRoute::Kroki,
            _ => RenderRoute::Client,
        }
    }
}

/// Output format for diagram files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramFormat {
    /// SVG file (default).
    #[default]
    Svg,
    /// PNG rasterized from the SVG.
    Png,
}

impl DiagramFormat {
    /// Parse format from attribute value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// File extension.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}
