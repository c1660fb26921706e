use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport failure: {0}")] Transport(String),
    #[error("backend returned no image payload: {0}")] EmptyGenerationResponse(String),
    #[error("malformed response: {0}")] MalformedResponse(String),
    #[error("no candidate subject: {0}")] NoCandidateSubject(String),
    #[error("image processing failed: {0}")] ImageProcessing(String),
    #[error("persona error: {0}")] Persona(String),
    #[error("configuration error: {0}")] Config(String),
    #[error("export failed: {0}")] Export(String),
    #[error("{stage} failed: {source}")]
    Fatal {
        stage: &'static str,
        #[source]
        source: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Transport failures and empty image replies are worth another attempt;
    /// everything else is a property of the payload or the caller's input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::EmptyGenerationResponse(_))
    }

    pub fn fatal(stage: &'static str, source: GenerationError) -> Self {
        Self::Fatal { stage, source: Box::new(source) }
    }

    /// The innermost cause, looking through `Fatal` wrappers.
    pub fn root_cause(&self) -> &GenerationError {
        match self {
            Self::Fatal { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<image::ImageError> for GenerationError {
    fn from(e: image::ImageError) -> Self {
        Self::ImageProcessing(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
