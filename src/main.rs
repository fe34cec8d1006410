// ==========================================
// 表格数据导入管道 - 命令行入口
// ==========================================
// 用法:
//   tabular-import <file> --entity <name> [--mode append|replace|update]
//                  [--db <path>] [--org <id>] [--user <id>] [--batch-size <n>]
//                  [--config <json>] [--template <name>] [--json-log]
//
// 非交互地驱动完整向导：自动映射 → 校验 → 导入本地 SQLite
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tabular_import::domain::ImportStrategy;
use tabular_import::repository::{SqliteRecordStore, TemplateStore};
use tabular_import::wizard::{PipelineServices, StaticIdentity};
use tabular_import::{logging, ImportApi, ImportConfig};

const DEFAULT_DB_PATH: &str = "tabular_import.db";

#[derive(Debug)]
struct CliArgs {
    file: PathBuf,
    entity: Option<String>,
    config: Option<PathBuf>,
    mode: ImportStrategy,
    db_path: String,
    organization_id: String,
    user_id: String,
    batch_size: Option<usize>,
    template: Option<String>,
    json_log: bool,
}

fn usage() -> &'static str {
    "用法: tabular-import <file> --entity <name> [--mode append|replace|update] \
     [--db <path>] [--org <id>] [--user <id>] [--batch-size <n>] \
     [--config <json>] [--template <name>] [--json-log]"
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<CliArgs> {
    let mut file = None;
    let mut entity = None;
    let mut config = None;
    let mut mode = ImportStrategy::Append;
    let mut db_path = DEFAULT_DB_PATH.to_string();
    let mut organization_id = "default".to_string();
    let mut user_id = "cli".to_string();
    let mut batch_size = None;
    let mut template = None;
    let mut json_log = false;

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("参数 {} 缺少取值\n{}", name, usage()))
        };
        match arg.as_str() {
            "--entity" => entity = Some(value("--entity")?),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--mode" => mode = value("--mode")?.parse().map_err(|e: String| anyhow!(e))?,
            "--db" => db_path = value("--db")?,
            "--org" => organization_id = value("--org")?,
            "--user" => user_id = value("--user")?,
            "--batch-size" => {
                let raw = value("--batch-size")?;
                batch_size = Some(raw.parse().with_context(|| format!("无效的批次大小: {}", raw))?);
            }
            "--template" => template = Some(value("--template")?),
            "--json-log" => json_log = true,
            "-h" | "--help" => bail!("{}", usage()),
            other if other.starts_with("--") => bail!("未知参数: {}\n{}", other, usage()),
            other => {
                if file.replace(PathBuf::from(other)).is_some() {
                    bail!("只能指定一个文件\n{}", usage());
                }
            }
        }
    }

    let file = file.ok_or_else(|| anyhow!("缺少文件参数\n{}", usage()))?;
    if entity.is_none() && config.is_none() {
        bail!("必须指定 --entity 或 --config\n{}", usage());
    }

    Ok(CliArgs {
        file,
        entity,
        config,
        mode,
        db_path,
        organization_id,
        user_id,
        batch_size,
        template,
        json_log,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.json_log {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("表格数据导入 - 版本 {}", tabular_import::VERSION);
    tracing::info!("==================================================");

    // 配置：--config 优先，--entity 覆盖实体名
    let mut config = match &args.config {
        Some(path) => ImportConfig::from_json_file(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?,
        None => ImportConfig::for_entity(args.entity.as_deref().unwrap_or_default()),
    };
    if let Some(entity) = &args.entity {
        config.entity = entity.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    tracing::info!("使用数据库: {}", args.db_path);
    let store = Arc::new(
        SqliteRecordStore::new(&args.db_path)
            .with_context(|| format!("无法打开数据库: {}", args.db_path))?,
    );

    let mut services = PipelineServices::new(
        store.clone(),
        Arc::new(StaticIdentity::new(&args.user_id, &args.organization_id)),
    )
    .with_run_log(store.clone());
    match TemplateStore::default_path() {
        Ok(path) => services = services.with_templates(Arc::new(TemplateStore::new(path))),
        Err(e) => tracing::warn!("模板存储不可用: {}", e),
    }

    let api = ImportApi::init(&config, services)?;
    if let Some(key) = api.conflict_key() {
        store.register_key(api.entity(), key)?;
    }

    let response = api
        .import_file(&args.file, args.mode, args.template.as_deref())
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
