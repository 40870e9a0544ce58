//! Plain-text report, written incrementally as origins complete
//!
//! The layout is line-oriented and stable so downstream tools can parse it:
//!
//! ```text
//! --- 来源: https://example.com/app.js ---
//! ============================================================
//! 类型: RESTful, 请求: "GET /api/users"
//! 请求参数: 无参数
//! ------------------------------------------------------------
//! ```

use crate::error::Result;
use crate::models::{AcquireWarning, OriginReport, ParameterBlock, RunStatus};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const RULE_WIDTH: usize = 60;

/// Placeholder form used in rendered parameter text
pub fn rendered_placeholder(id: usize) -> String {
    format!("__JS_EXPR_{id}__")
}

/// Parameter text as shown in reports: repaired text when available, with
/// placeholders in their rendered form
pub fn render_parameters(block: &ParameterBlock) -> String {
    let Some(repaired) = block.repaired_text.as_deref() else {
        return block.raw_text.clone();
    };
    block.expressions.iter().fold(repaired.to_string(), |text, slot| {
        text.replace(
            &ParameterBlock::placeholder(slot.id),
            &rendered_placeholder(slot.id),
        )
    })
}

/// Renders the block for one origin, including its trailing blank line
pub fn render_origin(report: &OriginReport) -> String {
    let mut lines = vec![
        format!("\n--- 来源: {} ---", report.origin),
        "=".repeat(RULE_WIDTH),
    ];

    if report.candidates.is_empty() {
        lines.push("未找到请求信息".to_string());
    }
    for candidate in &report.candidates {
        lines.push(format!(
            "类型: {}, 请求: \"{} {}\"",
            candidate.kind,
            candidate.method_label(),
            candidate.url
        ));
        match &candidate.parameters {
            Some(block) if candidate.has_parameters() => {
                lines.push(format!("请求参数: {}", render_parameters(block)));
            }
            _ => lines.push("请求参数: 无参数".to_string()),
        }
        lines.push("-".repeat(RULE_WIDTH));
    }

    lines.join("\n") + "\n\n"
}

/// Incremental writer for the text report
pub struct TextReport<W: Write> {
    out: W,
}

impl TextReport<BufWriter<File>> {
    /// Creates (truncating) the report file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        info!("Writing text report to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_header(&mut self, generated_at: DateTime<Local>) -> Result<()> {
        write!(
            self.out,
            "# JavaScript API 请求提取结果\n# 生成时间: {}\n\n",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        self.out.flush()?;
        Ok(())
    }

    /// Appends one origin block and flushes it
    pub fn write_origin(&mut self, report: &OriginReport) -> Result<()> {
        self.out.write_all(render_origin(report).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    pub fn write_warning(&mut self, warning: &AcquireWarning) -> Result<()> {
        writeln!(self.out, "# 警告: {warning}\n")?;
        self.out.flush()?;
        Ok(())
    }

    /// Appends the trailer for `status` and returns the underlying writer
    pub fn finish(mut self, status: &RunStatus) -> Result<W> {
        match status {
            RunStatus::Completed => {}
            RunStatus::Interrupted => write!(self.out, "\n\n# 操作已被用户中断。\n")?,
            RunStatus::Failed(reason) => {
                write!(self.out, "\n\n# 处理过程中发生意外错误: {reason}\n")?
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }
}
