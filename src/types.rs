// src/types.rs
use serde::Deserialize;

// 连接模式
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Live,
    Simulation,
}

impl ConnectionMode {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionMode::Live => "LIVE",
            ConnectionMode::Simulation => "SIM",
        }
    }
}

// 会话连接状态
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Open,
}

/// Identifies one connection lifetime; events from older links are stale.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

// 连接线程发给会话的事件
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEventKind {
    Opened,
    Frame(String),
    Closed { code: Option<u16>, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub link: LinkId,
    pub kind: StreamEventKind,
}
