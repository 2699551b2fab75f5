// 遥测核心：样本模型、滚动窗口、投影与图表导出
pub mod buffer;
pub mod error;
pub mod plot;
pub mod projection;
pub mod sample;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::{SampleWindow, DEFAULT_MAX_POINTS};
pub use error::ViewerError;
pub use plot::{render_chart_png, PlotStyle};
pub use projection::{EventMarker, MetricSeries, Projection};
pub use sample::{decode_frame, Decoded, Metric, Sample, WireFrame};
