// ==========================================
// 表格数据导入管道 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各环节的接口（不包含实现）
// ==========================================

use crate::domain::{FieldCatalog, Mapping, ParsedRow, ParsedTable, RowReport};
use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文本类表格解析（CSV 方言）
// 实现者: CsvParser
pub trait FileParser: Send + Sync {
    /// 将文件内容解析为表头 + 行记录
    ///
    /// # 参数
    /// - filename: 原始文件名（用于错误信息）
    /// - bytes: 文件全部内容
    ///
    /// # 返回
    /// - Ok(ParsedTable): 表头与行记录
    /// - Err: 空文件 / 缺少数据行 / CSV 格式错误
    fn parse_bytes(&self, filename: &str, bytes: &[u8]) -> ImportResult<ParsedTable>;
}

// ==========================================
// ExcelConverter Trait
// ==========================================
// 用途: Excel → 表头 + 行记录 的外部转换能力
// 实现者: CalamineExcelConverter（本地）或宿主注入的远程服务
#[async_trait]
pub trait ExcelConverter: Send + Sync {
    async fn convert(&self, filename: &str, bytes: &[u8]) -> ImportResult<ParsedTable>;
}

// ==========================================
// RowValidationHook Trait
// ==========================================
// 用途: 可插拔的行级自定义校验，追加 errors / warnings
// 实现者: RuleSetHook（声明式规则）或宿主自定义实现
pub trait RowValidationHook: Send + Sync {
    /// # 参数
    /// - row_number: 1-based 数据行号
    /// - row: 原始行
    /// - mapping: 当前映射
    /// - catalog: 目标字段目录
    /// - report: 追加目标
    fn validate(
        &self,
        row_number: usize,
        row: &ParsedRow,
        mapping: &Mapping,
        catalog: &FieldCatalog,
        report: &mut RowReport,
    );
}
