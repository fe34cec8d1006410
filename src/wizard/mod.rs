// ==========================================
// 表格数据导入管道 - 导入向导
// ==========================================
// 职责: 持有导入会话，按步骤编排 解析/映射/校验/入库
// 外部协作者: 身份上下文 / 通知 / 生命周期事件
// ==========================================

pub mod collaborators;
pub mod session;
pub mod state_machine;

pub use collaborators::{
    BroadcastEventSink, IdentityProvider, ImportEvent, ImportEventSink, Notifier,
    PipelineServices, StaticIdentity, TracingNotifier,
};
pub use session::ImportSession;
pub use state_machine::{ImportOutcome, ImportPreview, ImportWizard};
