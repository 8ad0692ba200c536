use super::client::MessageChannel;
use crate::config::ServiceConfig;
use anyhow::Context;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::info;

/// 실행 중인 네이티브 서비스 프로세스와 연결된 채널이다.
#[derive(Debug)]
pub struct NativeService {
    /// 서비스와의 메시지 채널.
    pub channel: MessageChannel,
    /// 자식 프로세스 핸들.
    child: Child,
}

impl NativeService {
    /// 서비스 프로세스를 종료하고 채널이 닫히기를 기다린다.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if self.child.id().is_some() {
            self.child
                .kill()
                .await
                .context("네이티브 서비스 종료 실패")?;
        }
        self.channel.closed().await;
        Ok(())
    }
}

/// 네이티브 서비스를 실행하고 stdin/stdout을 메시지 채널에 연결한다.
///
/// stderr는 그대로 상속한다. 연결이 끊긴 채널은 다시 spawn해야 사용할 수 있다.
pub fn spawn_service(
    config: &ServiceConfig,
    request_timeout: Duration,
) -> anyhow::Result<NativeService> {
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("네이티브 서비스 실행 실패: {}", config.program.display()))?;
    let stdin = child
        .stdin
        .take()
        .context("네이티브 서비스 stdin을 열 수 없습니다.")?;
    let stdout = child
        .stdout
        .take()
        .context("네이티브 서비스 stdout을 열 수 없습니다.")?;
    info!(program = %config.program.display(), pid = ?child.id(), "네이티브 서비스 시작");
    let channel = MessageChannel::connect(stdout, stdin, request_timeout);
    Ok(NativeService { channel, child })
}
