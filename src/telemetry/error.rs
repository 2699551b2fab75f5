use thiserror::Error;
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("device identifier must not be empty")]
    EmptyDeviceId,
    #[error("invalid stream endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("failed to open stream link: {0}")]
    Connect(String),
    #[error("failed to render chart: {0}")]
    Plot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
impl From<url::ParseError> for ViewerError {
    fn from(value: url::ParseError) -> Self {
        ViewerError::InvalidEndpoint(value.to_string())
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ViewerError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ViewerError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for ViewerError {
    fn from(value: image::ImageError) -> Self {
        ViewerError::Plot(value.to_string())
    }
}
