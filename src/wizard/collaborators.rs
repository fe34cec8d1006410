// ==========================================
// 表格数据导入管道 - 向导外部协作者
// ==========================================
// 身份上下文 / 通知 / 生命周期事件 + 向导依赖集合
// ==========================================

use crate::domain::{Identity, ImportStrategy, NotifyLevel};
use crate::importer::UniversalFileParser;
use crate::repository::{ImportRunLog, RecordStore, TemplateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

// ==========================================
// IdentityProvider - 已认证身份（同步读取）
// ==========================================
pub trait IdentityProvider: Send + Sync {
    /// None 表示尚未登录或缺少组织上下文
    fn identity(&self) -> Option<Identity>;
}

/// 固定身份（CLI / 测试）
#[derive(Debug, Clone)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn new(user_id: &str, organization_id: &str) -> Self {
        Self(Some(Identity {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
        }))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

// ==========================================
// Notifier - 面向用户的通知（发后即忘）
// ==========================================
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// 将通知写入 tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Info => info!(target: "tabular_import::notify", "{}", message),
            NotifyLevel::Success => info!(target: "tabular_import::notify", success = true, "{}", message),
            NotifyLevel::Warning => warn!(target: "tabular_import::notify", "{}", message),
            NotifyLevel::Error => error!(target: "tabular_import::notify", "{}", message),
        }
    }
}

// ==========================================
// 生命周期事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportEvent {
    #[serde(rename_all = "camelCase")]
    ImportComplete {
        entity: String,
        total_records: usize,
        mode: ImportStrategy,
    },
}

pub trait ImportEventSink: Send + Sync {
    fn emit(&self, event: ImportEvent);
}

/// 基于 tokio broadcast 的事件分发
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ImportEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ImportEventSink for BroadcastEventSink {
    fn emit(&self, event: ImportEvent) {
        // 无订阅者时 send 返回 Err，事件直接丢弃
        if self.sender.send(event).is_err() {
            debug!("无事件订阅者");
        }
    }
}

// ==========================================
// PipelineServices - 向导依赖集合（宿主构造后注入）
// ==========================================
#[derive(Clone)]
pub struct PipelineServices {
    pub parser: Arc<UniversalFileParser>,
    pub store: Arc<dyn RecordStore>,
    pub run_log: Option<Arc<dyn ImportRunLog>>,
    pub templates: Option<Arc<TemplateStore>>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub events: Arc<dyn ImportEventSink>,
}

impl PipelineServices {
    /// 最小依赖：记录存储 + 身份；其余取默认实现
    pub fn new(store: Arc<dyn RecordStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            parser: Arc::new(UniversalFileParser::default()),
            store,
            run_log: None,
            templates: None,
            identity,
            notifier: Arc::new(TracingNotifier),
            events: Arc::new(BroadcastEventSink::default()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<UniversalFileParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<dyn ImportRunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn with_templates(mut self, templates: Arc<TemplateStore>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn ImportEventSink>) -> Self {
        self.events = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity() {
        let identity = StaticIdentity::new("u1", "org1").identity().unwrap();
        assert_eq!(identity.organization_id, "org1");
        assert!(StaticIdentity::anonymous().identity().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastEventSink::default();
        // 无订阅者时不报错
        sink.emit(ImportEvent::ImportComplete {
            entity: "products".into(),
            total_records: 1,
            mode: ImportStrategy::Append,
        });

        let mut rx = sink.subscribe();
        sink.emit(ImportEvent::ImportComplete {
            entity: "products".into(),
            total_records: 3,
            mode: ImportStrategy::Replace,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ImportEvent::ImportComplete {
                entity: "products".into(),
                total_records: 3,
                mode: ImportStrategy::Replace,
            }
        );
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(ImportEvent::ImportComplete {
            entity: "shipments".into(),
            total_records: 12,
            mode: ImportStrategy::Update,
        })
        .unwrap();
        assert_eq!(json["type"], "importComplete");
        assert_eq!(json["totalRecords"], 12);
        assert_eq!(json["mode"], "update");
    }
}
