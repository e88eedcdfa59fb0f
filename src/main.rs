// ==========================================
// CRM 导入管道 - 命令行入口
// ==========================================
// 用法:
//   crm-import <file> <customers|orders> [--commit] [--upsert] [--db <path>] [--errors <out.csv>]
//
// 默认只生成预览；加 --commit 才会写库
// ==========================================

use anyhow::{anyhow, bail, Context};
use crm_import::api::{CommitRequest, ImportApi, UploadRequest};
use crm_import::db::default_db_path;
use crm_import::{logging, FieldError, ImportTarget, SourceFormat};
use std::path::{Path, PathBuf};

const USAGE: &str = "用法: crm-import <file> <customers|orders> [--commit] [--upsert] [--db <path>] [--errors <out.csv>]";

#[derive(Debug)]
struct CliArgs {
    file: PathBuf,
    target: ImportTarget,
    commit: bool,
    upsert: bool,
    db_path: Option<String>,
    errors_out: Option<PathBuf>,
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut positional = Vec::new();
    let mut commit = false;
    let mut upsert = false;
    let mut db_path = None;
    let mut errors_out = None;

    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--commit" => commit = true,
            "--upsert" => upsert = true,
            "--db" => {
                db_path = Some(args.next().ok_or_else(|| anyhow!("--db 缺少路径参数"))?);
            }
            "--errors" => {
                let out = args.next().ok_or_else(|| anyhow!("--errors 缺少路径参数"))?;
                errors_out = Some(PathBuf::from(out));
            }
            "-h" | "--help" => bail!("{}", USAGE),
            flag if flag.starts_with("--") => bail!("未知参数: {}\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    if positional.len() != 2 {
        bail!("{}", USAGE);
    }
    let target = ImportTarget::parse(&positional[1])
        .ok_or_else(|| anyhow!("未知的导入目标: {}（可选 customers / orders）", positional[1]))?;

    Ok(CliArgs {
        file: PathBuf::from(&positional[0]),
        target,
        commit,
        upsert,
        db_path,
        errors_out,
    })
}

fn print_errors(errors: &[FieldError]) {
    for err in errors.iter().take(20) {
        eprintln!("  第 {} 行 [{}] {}", err.row, err.field, err.message);
    }
    if errors.len() > 20 {
        eprintln!("  ... 共 {} 条错误", errors.len());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args = parse_args(std::env::args().skip(1))?;
    let db_path = args.db_path.clone().unwrap_or_else(default_db_path);

    tracing::info!("==================================================");
    tracing::info!("{} v{}", crm_import::APP_NAME, crm_import::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let payload = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("读取文件失败: {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.display().to_string());
    let media_type = SourceFormat::from_file_name(&file_name)
        .map(|f| f.media_type())
        .unwrap_or("application/octet-stream");

    let api = ImportApi::open(&db_path).await?;

    // 1. 预览
    let preview = api
        .upload_preview(UploadRequest {
            file_name: file_name.clone(),
            media_type: media_type.to_string(),
            payload,
            target: args.target,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);

    if !preview.unmapped_required.is_empty() {
        eprintln!("必填字段未映射: {}", preview.unmapped_required.join(", "));
    }

    // 2. 提交（可选）
    let errors = if args.commit {
        let result = api
            .commit(CommitRequest {
                preview_id: preview.preview_id.clone(),
                upsert: args.upsert,
            })
            .await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        result.errors
    } else {
        preview.errors
    };

    if !errors.is_empty() {
        print_errors(&errors);
    }

    // 3. 错误报告（可选）
    if let Some(out) = args.errors_out.as_deref() {
        write_error_report(&api, &file_name, &errors, out).await?;
    }

    Ok(())
}

async fn write_error_report(
    api: &ImportApi,
    file_name: &str,
    errors: &[FieldError],
    out: &Path,
) -> anyhow::Result<()> {
    if errors.is_empty() {
        tracing::info!("无行级错误，跳过错误报告");
        return Ok(());
    }
    let report = api.export_error_report(file_name, errors)?;
    tokio::fs::write(out, &report.content)
        .await
        .with_context(|| format!("写入错误报告失败: {}", out.display()))?;
    tracing::info!(path = %out.display(), errors = errors.len(), "错误报告已导出");
    Ok(())
}
