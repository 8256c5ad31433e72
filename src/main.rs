use anyhow::Result;
use doc_summary_flow::utils::logging;
use doc_summary_flow::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（CONFIG_FILE + 环境变量覆盖）
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config)?.run().await?;

    Ok(())
}
