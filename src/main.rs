use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use desk_replay::channel::{ChannelNativeActions, NativeActions, NativeService, spawn_service};
use desk_replay::config::{AppConfig, load_config_from_file};
use desk_replay::engine::{EngineEvent, ExecutionEngine, ProgressStatus, RunStatus};
use desk_replay::recorder::{RecorderIntent, RecordingSession};
use desk_replay::scenario::{JsonFilePersistence, Point};
use desk_replay::store::{HistoryLog, ScenarioStore, SharedScenarioStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "desk-replay")]
#[command(about = "데스크톱 UI 조작을 녹화하고 재생한다")]
struct Cli {
    /// YAML 설정 파일 경로
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 시나리오 목록 (최근 사용 순)
    List,

    /// 시나리오 Step 보기
    Show {
        /// 시나리오 ID 또는 이름
        scenario: String,
    },

    /// 시나리오에서 Step 하나 삭제
    DeleteStep {
        /// 시나리오 ID 또는 이름
        scenario: String,
        /// 삭제할 Step 인덱스 (0부터)
        index: usize,
    },

    /// 시나리오 실행 (Ctrl+C로 중단)
    Run {
        /// 시나리오 ID 또는 이름
        scenario: String,
    },

    /// 녹화 (Ctrl+C로 종료)
    Record {
        /// 이어서 녹화할 시나리오 ID 또는 이름. 없으면 새로 만든다.
        #[arg(short, long)]
        scenario: Option<String>,

        /// 새 시나리오 이름
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// 입력/화면 캡처 권한 확인
    Permissions,

    /// 한 픽셀의 현재 색상 읽기
    PixelColor { x: i32, y: i32 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from_file(path)?,
        None => AppConfig::default(),
    };
    let config = &config;
    let store = open_store(config)?;

    match cli.command {
        Commands::List => list(&store).await,
        Commands::Show { scenario } => show(&store, &scenario).await,
        Commands::DeleteStep { scenario, index } => {
            delete_step(config, &store, &scenario, index).await
        }
        Commands::Run { scenario } => {
            with_service(config, |service| run(config, store, service, scenario)).await
        }
        Commands::Record { scenario, name } => {
            with_service(config, |service| record(config, store, service, scenario, name)).await
        }
        Commands::Permissions => {
            with_service(config, |service| async move {
                let permissions = actions(config, &service).check_permissions().await?;
                println!(
                    "접근성: {}  화면 캡처: {}",
                    granted(permissions.accessibility),
                    granted(permissions.screen_capture)
                );
                Ok(service)
            })
            .await
        }
        Commands::PixelColor { x, y } => {
            with_service(config, |service| async move {
                let color = actions(config, &service)
                    .get_pixel_color(Point { x, y })
                    .await?;
                println!("({x}, {y}) = rgb({}, {}, {})", color.r, color.g, color.b);
                Ok(service)
            })
            .await
        }
    }
}

fn open_store(config: &AppConfig) -> Result<SharedScenarioStore> {
    let persistence = JsonFilePersistence::new(&config.storage.path);
    let store = ScenarioStore::open(Box::new(persistence)).with_context(|| {
        format!(
            "시나리오 파일을 열 수 없습니다: {}",
            config.storage.path.display()
        )
    })?;
    Ok(store.into_shared())
}

fn actions(config: &AppConfig, service: &NativeService) -> ChannelNativeActions {
    ChannelNativeActions::new(service.channel.clone(), config.engine.pixel_wait_grace())
}

fn granted(flag: bool) -> &'static str {
    if flag { "허용" } else { "거부" }
}

/// 네이티브 서비스를 띄워 작업을 수행한 뒤 종료한다.
async fn with_service<F, Fut>(config: &AppConfig, task: F) -> Result<()>
where
    F: FnOnce(NativeService) -> Fut,
    Fut: std::future::Future<Output = Result<NativeService>>,
{
    let service = spawn_service(&config.service, config.channel.request_timeout())?;
    let service = task(service).await?;
    service.shutdown().await
}

async fn list(store: &SharedScenarioStore) -> Result<()> {
    let store = store.read().await;
    for scenario in store.sorted_scenarios() {
        println!(
            "{}  {:<24} {:>3} steps  {}",
            scenario.id,
            scenario.name,
            scenario.len(),
            scenario.last_used_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn show(store: &SharedScenarioStore, target: &str) -> Result<()> {
    let store = store.read().await;
    let Some(scenario) = store.find(target) else {
        bail!("시나리오를 찾을 수 없습니다: {target}");
    };
    println!("{} ({})", scenario.name, scenario.id);
    for (index, step) in scenario.steps.iter().enumerate() {
        println!("{index:>3}. {}", step.describe());
    }
    Ok(())
}

async fn delete_step(
    config: &AppConfig,
    store: &SharedScenarioStore,
    target: &str,
    index: usize,
) -> Result<()> {
    let mut store = store.write().await;
    let Some(id) = store.find(target).map(|scenario| scenario.id.clone()) else {
        bail!("시나리오를 찾을 수 없습니다: {target}");
    };
    let mut history = HistoryLog::from_config(&config.history);
    match history.delete_step(&mut store, &id, index)? {
        Some(step) => println!("삭제: {index:>3}. {}", step.describe()),
        None => bail!("Step 인덱스가 범위를 벗어났습니다: {index}"),
    }
    Ok(())
}

async fn run(
    config: &AppConfig,
    store: SharedScenarioStore,
    service: NativeService,
    target: String,
) -> Result<NativeService> {
    let Some(root) = store.read().await.find(&target).cloned() else {
        bail!("시나리오를 찾을 수 없습니다: {target}");
    };
    let engine = ExecutionEngine::new(
        store.clone(),
        Arc::new(actions(config, &service)),
        config.engine.clone(),
    );
    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Progress(progress) => match progress.status {
                    ProgressStatus::Waiting => {
                        println!("[{}/{}] 픽셀 조건 대기 중", progress.current, progress.total)
                    }
                    ProgressStatus::Running => {}
                    ProgressStatus::Finished(_) => {
                        println!("[{}/{}] 종료", progress.current, progress.total)
                    }
                },
                EngineEvent::StepLog { step_number, line } => println!("[{step_number}] {line}"),
            }
        }
    });

    let status = engine.run_scenario(&root, cancel, tx).await;
    let _ = printer.await;
    match status {
        RunStatus::Completed => info!("실행 완료"),
        RunStatus::Aborted => warn!("사용자에 의해 실행이 중단되었습니다."),
        RunStatus::Error(message) => {
            service.shutdown().await?;
            bail!(message);
        }
    }
    Ok(service)
}

async fn record(
    config: &AppConfig,
    store: SharedScenarioStore,
    service: NativeService,
    target: Option<String>,
    name: String,
) -> Result<NativeService> {
    let naming = {
        let mut store = store.write().await;
        let selected = match target {
            Some(target) => match store.find(&target) {
                Some(scenario) => Some(scenario.id.clone()),
                None => bail!("시나리오를 찾을 수 없습니다: {target}"),
            },
            None => None,
        };
        store.select_scenario(selected.as_deref());
        selected.is_none()
    };
    let session = RecordingSession::new(
        store.clone(),
        Arc::new(actions(config, &service)),
        config.recorder.clone(),
    );
    let events = RecordingSession::subscribe(&service.channel);
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let mut intents = vec![RecorderIntent::Start];
    if naming {
        intents.extend(name.chars().map(RecorderIntent::InputChar));
        intents.push(RecorderIntent::Confirm);
    }
    for intent in intents {
        let _ = intent_tx.send(intent);
    }
    let machine = session.run(intent_rx, events, cancel).await;
    drop(intent_tx);
    info!(state = ?machine.state(), "녹화 종료");
    Ok(service)
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("중단 신호 수신");
            cancel.cancel();
        }
    });
}
