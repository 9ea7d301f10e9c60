/// 服务器配置 - 票务核心的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/marquee/box-office | 工作目录 (存储、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | RESERVATION_TTL_SECS | 900 | 结账预留有效期 (秒) |
/// | SWEEP_INTERVAL_SECS | 60 | 过期预留清扫周期 (秒) |
/// | CONFLICT_MAX_RETRIES | 8 | 乐观并发冲突最大重试次数 |
/// | CONFLICT_RETRY_BASE_MS | 10 | 冲突重试退避基数 (毫秒) |
/// | TICKET_CODE_MAX_RETRIES | 5 | 票码碰撞最大重试次数 |
/// | QR_SIGNING_KEY | (dev default) | QR 摘要签名密钥 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/box-office HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 票务核心参数 ===
    /// 结账预留有效期 (秒)：超过未确认支付的预留会被清扫释放
    pub reservation_ttl_secs: u64,
    /// 过期预留清扫周期 (秒)
    pub sweep_interval_secs: u64,
    /// 乐观并发冲突最大重试次数，耗尽后向调用方返回瞬态失败
    pub conflict_max_retries: u32,
    /// 冲突重试退避基数 (毫秒)，第 n 次重试等待 n * base
    pub conflict_retry_base_ms: u64,
    /// 票码生成碰撞最大重试次数
    pub ticket_code_max_retries: u32,
    /// QR 摘要签名密钥
    pub qr_signing_key: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR")
                .unwrap_or_else(|_| "/var/lib/marquee/box-office".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            reservation_ttl_secs: std::env::var("RESERVATION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            conflict_max_retries: std::env::var("CONFLICT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            conflict_retry_base_ms: std::env::var("CONFLICT_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            ticket_code_max_retries: std::env::var("TICKET_CODE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            qr_signing_key: std::env::var("QR_SIGNING_KEY")
                .unwrap_or_else(|_| "dev-qr-signing-key".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
