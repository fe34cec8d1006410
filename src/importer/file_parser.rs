// ==========================================
// 表格数据导入管道 - 文件解析器实现
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls，委托 ExcelConverter)
// 规则: 分隔符整文件只判定一次（; → TAB → ,），字段去首尾空白，短行补空串
// ==========================================

use crate::domain::{ParsedRow, ParsedTable};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{ExcelConverter, FileParser};
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Timelike;
use csv::{ReaderBuilder, Trim};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 按表头组装一行：缺失列补空串；重复表头取首次出现的值
fn build_row<'a, I>(headers: &[String], values: I) -> ParsedRow
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = values.into_iter().collect();
    let mut row = ParsedRow::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let value = values.get(idx).map(|v| v.trim()).unwrap_or("");
        row.entry(header.clone()).or_insert_with(|| value.to_string());
    }
    row
}

/// 单元格转文本：Excel 日期单元格输出 ISO 文本，其余按显示值
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(ts) if ts.num_seconds_from_midnight() == 0 => ts.format("%Y-%m-%d").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        _ => cell.to_string(),
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 分隔符嗅探：依次检测 ';'、TAB，否则回落 ','
    pub fn sniff_delimiter(header_line: &str) -> u8 {
        if header_line.contains(';') {
            b';'
        } else if header_line.contains('\t') {
            b'\t'
        } else {
            b','
        }
    }

    /// 解析 CSV 文本
    pub fn parse_text(&self, filename: &str, text: &str) -> ImportResult<ParsedTable> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            return Err(ImportError::EmptyFile(filename.to_string()));
        }

        let delimiter = Self::sniff_delimiter(lines[0]);
        debug!(delimiter = %(delimiter as char).escape_default(), "CSV 分隔符判定");

        let content = lines.join("\n");
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .quote(b'"')
            .double_quote(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut records = reader.records();

        // 读取表头
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
            None => return Err(ImportError::EmptyFile(filename.to_string())),
        };

        // 读取所有行
        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(build_row(&headers, record.iter()));
        }

        if rows.is_empty() {
            return Err(ImportError::EmptyFile(filename.to_string()));
        }

        Ok(ParsedTable { headers, rows })
    }
}

impl FileParser for CsvParser {
    fn parse_bytes(&self, filename: &str, bytes: &[u8]) -> ImportResult<ParsedTable> {
        let text = String::from_utf8_lossy(bytes);
        self.parse_text(filename, &text)
    }
}

// ==========================================
// Excel Converter 实现（calamine，本地转换）
// ==========================================
pub struct CalamineExcelConverter;

#[async_trait]
impl ExcelConverter for CalamineExcelConverter {
    async fn convert(&self, filename: &str, bytes: &[u8]) -> ImportResult<ParsedTable> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError(format!("{}: 无工作表", filename)))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 跳过完全空白的行（与 CSV 空行处理一致）
        let mut rows_iter = range.rows().filter(|r| {
            r.iter().any(|cell| !cell_text(cell).trim().is_empty())
        });

        let headers: Vec<String> = rows_iter
            .next()
            .ok_or_else(|| ImportError::EmptyFile(filename.to_string()))?
            .iter()
            .map(|cell| cell_text(cell).trim().to_string())
            .collect();

        let rows: Vec<ParsedRow> = rows_iter
            .map(|data_row| {
                let values: Vec<String> = data_row.iter().map(cell_text).collect();
                build_row(&headers, values.iter().map(String::as_str))
            })
            .collect();

        if rows.is_empty() {
            return Err(ImportError::EmptyFile(filename.to_string()));
        }

        Ok(ParsedTable { headers, rows })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser {
    csv: CsvParser,
    excel: Arc<dyn ExcelConverter>,
}

impl Default for UniversalFileParser {
    fn default() -> Self {
        Self::new(Arc::new(CalamineExcelConverter))
    }
}

impl UniversalFileParser {
    pub fn new(excel: Arc<dyn ExcelConverter>) -> Self {
        Self {
            csv: CsvParser,
            excel,
        }
    }

    /// 解析内存中的文件内容
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn parse_bytes(&self, filename: &str, bytes: &[u8]) -> ImportResult<ParsedTable> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let table = match ext.as_str() {
            "csv" => self.csv.parse_bytes(filename, bytes)?,
            "xlsx" | "xls" => self.excel.convert(filename, bytes).await?,
            _ => return Err(ImportError::UnsupportedFormat(filename.to_string())),
        };

        info!(
            headers = table.headers.len(),
            rows = table.rows.len(),
            "文件解析完成"
        );
        Ok(table)
    }

    /// 读取并解析磁盘文件（一次性读入内存）
    pub async fn parse_file<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ParsedTable> {
        let path = file_path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        self.parse_bytes(&filename, &bytes).await
    }
}
