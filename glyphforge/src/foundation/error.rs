pub type ForgeResult<T> = Result<T, ForgeError>;

/// Error taxonomy for the synthesis pipeline.
///
/// The scheduler classifies these into retry / skip / abort decisions, so the
/// variants carry enough structure to identify the implicated resource.
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing resource: {0}")]
    ResourceMissing(String),

    #[error("font '{font}' has no glyph for '{ch}'")]
    GlyphMiss { font: String, ch: char },

    #[error("rasterizer failure in '{font}': {message}")]
    RenderPanic { font: String, message: String },

    #[error("background '{path}' too small: {message}")]
    BackgroundTooSmall {
        path: String,
        message: String,
        /// True when the background cannot even cover the text extent.
        severe: bool,
    },

    #[error("corpus exhausted: {0}")]
    CorpusEmpty(String),

    #[error("no healthy resource: {0}")]
    NoHealthyResource(String),

    #[error("invariant violated: {0}")]
    InternalInvariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource_missing(msg: impl Into<String>) -> Self {
        Self::ResourceMissing(msg.into())
    }

    pub fn corpus_empty(msg: impl Into<String>) -> Self {
        Self::CorpusEmpty(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InternalInvariant(msg.into())
    }

    /// True when the scheduler may retry the task with a fresh resource.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GlyphMiss { .. }
                | Self::RenderPanic { .. }
                | Self::BackgroundTooSmall { .. }
                | Self::Io(_)
        )
    }

    /// Short stable label used for health bookkeeping and skip summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ResourceMissing(_) => "resource_missing",
            Self::GlyphMiss { .. } => "glyph_miss",
            Self::RenderPanic { .. } => "rasterizer_panic",
            Self::BackgroundTooSmall { severe: true, .. } => "background_smaller_than_text",
            Self::BackgroundTooSmall { severe: false, .. } => "background_smaller_than_canvas",
            Self::CorpusEmpty(_) => "corpus_empty",
            Self::NoHealthyResource(_) => "no_healthy_resource",
            Self::InternalInvariant(_) => "internal_invariant",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Font path implicated by this error, if any.
    pub fn implicated_font(&self) -> Option<&str> {
        match self {
            Self::GlyphMiss { font, .. } | Self::RenderPanic { font, .. } => Some(font),
            _ => None,
        }
    }

    /// Background path implicated by this error, if any.
    pub fn implicated_background(&self) -> Option<&str> {
        match self {
            Self::BackgroundTooSmall { path, .. } => Some(path),
            _ => None,
        }
    }
}
