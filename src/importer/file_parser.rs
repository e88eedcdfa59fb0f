// ==========================================
// CRM 导入管道 - Row Extractor（文件解析器）
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls)
// 输入: 上传的字节流（内存中，不落盘）
// 输出: ExtractedSheet（去重表头 + 带行号的原始行）
// ==========================================

use crate::domain::record::{ExtractedSheet, RawRow};
use crate::domain::types::SourceFormat;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveTime;
use csv::ReaderBuilder;
use std::io::Cursor;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 单一格式的解析器
pub trait SheetParser {
    fn parse(&self, payload: &[u8]) -> ImportResult<ExtractedSheet>;
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl SheetParser for CsvParser {
    fn parse(&self, payload: &[u8]) -> ImportResult<ExtractedSheet> {
        let payload = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(payload);

        let mut records = reader.records();

        // 第一条记录为表头；行号按表头后的记录序号计（跨行的引号单元格只算一行）
        let header = records
            .next()
            .ok_or_else(|| ImportError::ParseError("文件为空，缺少表头".to_string()))??;
        let header_cells: Vec<String> = header.iter().map(str::to_string).collect();

        let mut data_rows = Vec::new();
        for (idx, result) in records.enumerate() {
            let record = result?;
            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            data_rows.push((idx + 1, cells));
        }

        build_sheet(header_cells, data_rows)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl SheetParser for ExcelParser {
    fn parse(&self, payload: &[u8]) -> ImportResult<ExtractedSheet> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(payload.to_vec()))?;

        // 读取第一个 sheet
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ImportError::ParseError("Excel 文件无工作表".to_string()))??;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ParseError("工作表为空，缺少表头".to_string()))?;
        let header_cells: Vec<String> = header_row.iter().map(cell_to_string).collect();

        let data_rows = rows
            .enumerate()
            .map(|(idx, row)| (idx + 1, row.iter().map(cell_to_string).collect()))
            .collect();

        build_sheet(header_cells, data_rows)
    }
}

/// Excel 单元格转字符串
/// - 日期单元格: YYYY-MM-DD（含时间部分时附带 HH:MM:SS）
/// - 整数值的浮点: 输出整数文本（避免电话/数量出现 ".0"）
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time() == NaiveTime::MIN => ndt.date().format("%Y-%m-%d").to_string(),
            Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(e) => format!("#{:?}", e),
    }
}

/// 表头去重 + 行组装（两种格式共用）
///
/// # 规则
/// - 表头 TRIM；空表头列忽略；重名列保留首次出现
/// - 单元格 TRIM；空值视为缺失
/// - 完全空白的行跳过，行号不重排
fn build_sheet(
    header_cells: Vec<String>,
    data_rows: Vec<(usize, Vec<String>)>,
) -> ImportResult<ExtractedSheet> {
    let mut columns: Vec<String> = Vec::new();
    let mut column_at: Vec<Option<usize>> = Vec::with_capacity(header_cells.len());

    for name in header_cells {
        let name = name.trim().to_string();
        if name.is_empty() || columns.contains(&name) {
            column_at.push(None);
        } else {
            column_at.push(Some(columns.len()));
            columns.push(name);
        }
    }

    if columns.is_empty() {
        return Err(ImportError::ParseError("缺少表头".to_string()));
    }

    let mut rows = Vec::with_capacity(data_rows.len());
    for (row_number, cells) in data_rows {
        let mut row = RawRow::new(row_number);
        for (col_idx, value) in cells.into_iter().enumerate() {
            let Some(Some(slot)) = column_at.get(col_idx) else {
                continue;
            };
            let value = value.trim();
            if !value.is_empty() {
                row.push(columns[*slot].clone(), value);
            }
        }

        if row.is_blank() {
            debug!(row_number, "跳过空白行");
            continue;
        }
        rows.push(row);
    }

    Ok(ExtractedSheet { columns, rows })
}

// ==========================================
// 通用文件解析器（根据媒体类型/扩展名自动选择）
// ==========================================
pub struct UniversalFileParser {
    max_file_size_bytes: usize,
}

impl UniversalFileParser {
    pub fn new(max_file_size_bytes: usize) -> Self {
        Self { max_file_size_bytes }
    }

    /// 判定源文件格式
    ///
    /// 媒体类型优先；浏览器上报 application/octet-stream 等泛型类型时按扩展名判定
    pub fn detect_format(media_type: &str, file_name: &str) -> ImportResult<SourceFormat> {
        SourceFormat::from_media_type(media_type)
            .or_else(|| SourceFormat::from_file_name(file_name))
            .ok_or_else(|| ImportError::UnsupportedFormat(format!("{} ({})", media_type, file_name)))
    }

    /// 提取原始行
    ///
    /// # 参数
    /// - payload: 上传文件内容
    /// - media_type: 客户端声明的媒体类型
    /// - file_name: 原始文件名
    ///
    /// # 返回
    /// - Ok(ExtractedSheet): 表头 + 非空原始行
    /// - Err(FileTooLarge / UnsupportedFormat / ParseError)
    pub fn extract(
        &self,
        payload: &[u8],
        media_type: &str,
        file_name: &str,
    ) -> ImportResult<ExtractedSheet> {
        // 大小检查在解析之前
        if payload.len() > self.max_file_size_bytes {
            return Err(ImportError::FileTooLarge {
                size: payload.len(),
                limit: self.max_file_size_bytes,
            });
        }

        let format = Self::detect_format(media_type, file_name)?;
        let sheet = match format {
            SourceFormat::Csv => CsvParser.parse(payload)?,
            SourceFormat::Xls | SourceFormat::Xlsx => ExcelParser.parse(payload)?,
        };

        info!(
            file_name,
            format = %format,
            columns = sheet.columns.len(),
            rows = sheet.rows.len(),
            "文件解析完成"
        );
        Ok(sheet)
    }
}
