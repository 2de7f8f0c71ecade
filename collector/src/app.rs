//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::ApiServer;
use crate::core::cli::{self, CliConfig};
use crate::core::config::{AppConfig, LogFormat};
use crate::core::constants::{
    APP_NAME, APP_NAME_LOWER, ENV_LOG, TOPIC_SEGMENT_BUFFER, TOPIC_SEGMENT_PERSISTENCE,
};
use crate::core::shutdown::ShutdownService;
use crate::data::register::{
    RegisterReferenceIdExchanger, RegisterService, RegisterSpanIdExchanger,
};
use crate::data::store::SegmentStore;
use crate::data::topics::{Topic, TopicConfig, TopicService};
use crate::domain::listeners::register_default_listeners;
use crate::domain::segment::listener::ListenerManager;
use crate::domain::segment::sink::{BufferedSegment, Segment};
use crate::domain::{BufferReplayPipeline, SegmentParseService, SegmentPersistPipeline};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub topics: Arc<TopicService>,
    pub register: Arc<RegisterService>,
    pub store: Arc<SegmentStore>,
    pub parser: Arc<SegmentParseService>,
    persistence_topic: Topic<Segment>,
    buffer_topic: Topic<BufferedSegment>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let cli_config = cli::parse();
        Self::init_logging(cli_config.log_format.unwrap_or_default());
        tracing::debug!(app = APP_NAME, "Application starting");

        let app = Self::init(&cli_config)?;
        Self::start_server(app).await
    }

    /// Wire the ingestion graph. Background tasks are not started here.
    pub fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let topics = Arc::new(TopicService::new(TopicConfig::from(&config.pipeline)));
        let persistence_topic = topics
            .topic::<Segment>(TOPIC_SEGMENT_PERSISTENCE)
            .map_err(|e| anyhow::anyhow!("Failed to create persistence topic: {}", e))?;
        let buffer_topic = topics
            .topic::<BufferedSegment>(TOPIC_SEGMENT_BUFFER)
            .map_err(|e| anyhow::anyhow!("Failed to create buffer topic: {}", e))?;

        let register = Arc::new(RegisterService::new());
        let store = Arc::new(SegmentStore::new());

        let mut listener_manager = ListenerManager::new();
        register_default_listeners(&mut listener_manager, &store);

        let parser = Arc::new(SegmentParseService::new(
            Arc::new(listener_manager),
            Arc::new(RegisterSpanIdExchanger::new(register.clone())),
            Arc::new(RegisterReferenceIdExchanger::new(register.clone())),
            Arc::new(persistence_topic.publisher()),
            Arc::new(buffer_topic.publisher()),
        ));

        let shutdown = ShutdownService::new(topics.clone());

        Ok(Self {
            shutdown,
            config,
            topics,
            register,
            store,
            parser,
            persistence_topic,
            buffer_topic,
        })
    }

    fn init_logging(format: LogFormat) {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        match format {
            LogFormat::Compact => tracing_subscriber::fmt()
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true)
                .with_ansi(true)
                .compact()
                .with_env_filter(filter)
                .init(),
            LogFormat::Json => tracing_subscriber::fmt()
                .with_target(true)
                .json()
                .with_env_filter(filter)
                .init(),
        }
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    /// Start the register worker and the topic pipelines
    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(
                self.register
                    .clone()
                    .start_worker(self.config.register.interval, self.shutdown.subscribe()),
            )
            .await;

        let persist = SegmentPersistPipeline::new(self.store.clone());
        self.shutdown
            .register(persist.start(self.persistence_topic.clone(), self.shutdown.subscribe()))
            .await;

        if self.config.buffer.enabled {
            let replay =
                BufferReplayPipeline::new(self.parser.clone(), self.config.buffer.replay_delay);
            self.shutdown
                .register(replay.start(self.buffer_topic.clone(), self.shutdown.subscribe()))
                .await;
        } else {
            tracing::info!("Buffer replay disabled, unresolved segments will be dropped");
        }

        tracing::debug!("Background tasks started");
    }
}
