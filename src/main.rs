mod config;
mod crawler;
mod generator;
mod parser;
mod pipeline;
mod server;
mod storage;
mod utils;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::{AppConfig, SETTINGS_PATH};
use pipeline::{ConversionRequest, Pipeline};
use utils::logger;

#[derive(Parser)]
#[command(name = "docpack")]
#[command(about = "网页 / PDF / 图片内容提取并打包为 Word 文档", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置文件
    Init,
    /// 启动上传服务
    Serve,
    /// 在命令行直接转换
    Convert {
        /// 网页地址
        #[arg(short, long)]
        url: Option<String>,
        /// PDF 文件
        #[arg(short, long)]
        pdf: Option<PathBuf>,
        /// 图片文件，可重复
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,
        /// 输出 ZIP 路径
        #[arg(short, long, default_value = "output.zip")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init_logger();
    info!("docpack 启动");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Serve => {
            let app_config = AppConfig::load()?;
            server::serve(app_config).await?;
        }
        Commands::Convert {
            url,
            pdf,
            images,
            output,
        } => {
            convert_command(url, pdf, images, output).await?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化配置...");

    tokio::fs::create_dir_all("config").await?;
    let app_config = AppConfig::default();
    app_config.save(SETTINGS_PATH)?;
    info!("已生成配置文件: {}", SETTINGS_PATH);

    tokio::fs::create_dir_all(&app_config.server.static_dir).await?;
    info!("静态资源目录: {}", app_config.server.static_dir);

    info!("✅ 初始化完成，运行 'docpack serve' 启动服务");
    Ok(())
}

async fn convert_command(
    url: Option<String>,
    pdf: Option<PathBuf>,
    images: Vec<PathBuf>,
    output: PathBuf,
) -> Result<()> {
    let app_config = AppConfig::load()?;

    if images.len() > app_config.server.max_images {
        bail!("最多支持 {} 张图片，收到 {} 张", app_config.server.max_images, images.len());
    }

    let pdf = match pdf {
        Some(path) => Some(tokio::fs::read(&path).await?),
        None => None,
    };
    let mut image_bytes = Vec::with_capacity(images.len());
    for path in &images {
        image_bytes.push(tokio::fs::read(path).await?);
    }

    let pipeline = Pipeline::new(&app_config)?;
    let result = pipeline
        .run(ConversionRequest::new(url, pdf, image_bytes))
        .await?;

    tokio::fs::write(&output, &result.archive).await?;
    info!(
        "✅ 已生成 {}: {} 个块, {} 张图片",
        output.display(),
        result.document.len(),
        result.asset_count
    );
    Ok(())
}
