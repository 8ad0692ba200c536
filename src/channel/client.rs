use super::error::ChannelError;
use super::message::{ChannelEvent, InboundMessage, OutboundRequest, ResponseMessage, classify_line};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 전송로가 닫힌 뒤 발생하는 알림 이벤트 이름이다.
pub const EXIT_EVENT: &str = "exit";

/// 기본 요청 제한 시간이다.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 이벤트 리스너 타입이다. 오류나 패닉은 로그만 남기고 다른 리스너에 영향을 주지 않는다.
pub type EventListener = Arc<dyn Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync>;

/// `off`에 사용할 리스너 식별자이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type PendingResult = Result<Value, ChannelError>;

/// 네이티브 서비스와 줄 단위 JSON으로 통신하는 요청/응답 + 이벤트 채널이다.
///
/// 복제본은 같은 연결을 공유한다. 응답은 도착 순서가 아니라 `id`로 매칭된다.
#[derive(Clone)]
pub struct MessageChannel {
    /// 내부 상태를 보관한다.
    inner: Arc<ChannelInner>,
}

/// MessageChannel 내부 구현체이다.
struct ChannelInner {
    /// 다음 요청 ID를 생성하기 위한 카운터이다.
    next_id: AtomicU64,
    /// 대기 중인 요청과 응답 채널을 매핑한다.
    pending: DashMap<String, oneshot::Sender<PendingResult>>,
    /// 다음 리스너 ID 카운터이다.
    next_listener_id: AtomicU64,
    /// 이벤트 종류별 리스너 목록이다.
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventListener)>>>,
    /// writer 태스크로 보내는 직렬화된 요청 줄이다.
    outbound: mpsc::UnboundedSender<String>,
    /// 종료 처리를 한 번만 수행하기 위한 플래그이다.
    shut_down: AtomicBool,
    /// 전송로 종료 시 취소되는 토큰이다.
    closed: CancellationToken,
    /// 호출자가 지정하지 않을 때 쓰는 제한 시간이다.
    default_timeout: Duration,
}

impl MessageChannel {
    /// reader/writer 쌍 위에 채널을 열고 읽기/쓰기 태스크를 띄운다.
    ///
    /// Tokio 런타임 안에서 호출해야 한다.
    pub fn connect<R, W>(reader: R, writer: W, default_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ChannelInner {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            outbound: outbound_tx,
            shut_down: AtomicBool::new(false),
            closed: CancellationToken::new(),
            default_timeout,
        });
        tokio::spawn(write_loop(inner.clone(), writer, outbound_rx));
        tokio::spawn(read_loop(inner.clone(), reader));
        Self { inner }
    }

    /// 기본 제한 시간으로 요청을 보낸다.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ChannelError> {
        self.request_with_timeout(method, params, self.inner.default_timeout)
            .await
    }

    /// 지정한 제한 시간으로 요청을 보내고 매칭되는 응답을 기다린다.
    ///
    /// 제한 시간이 지나면 대기 항목을 지우고, 이후 도착한 응답은 로그만 남기고 버린다.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::ServiceUnavailable);
        }
        let id = format!("req-{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let line = serde_json::to_string(&OutboundRequest {
            id: &id,
            method,
            params: params.as_ref(),
        })
        .map_err(|err| ChannelError::Encode(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id.clone(), tx);
        let _guard = PendingGuard {
            inner: &self.inner,
            id: &id,
        };
        // 종료 처리와 경합한 경우 대기 항목이 영영 완료되지 않으므로 다시 확인한다.
        if self.is_closed() || self.inner.outbound.send(line).is_err() {
            return Err(ChannelError::ServiceUnavailable);
        }
        debug!(%id, method, "요청 전송");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChannelError::ServiceUnavailable),
            Err(_) => {
                warn!(%id, method, timeout_ms = timeout.as_millis() as u64, "요청 시간 초과");
                Err(ChannelError::RequestTimeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// 이벤트 종류에 리스너를 등록한다.
    pub fn on<F>(&self, event_type: &str, listener: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock_listeners()
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// 등록된 리스너를 제거한다. 제거했으면 true를 반환한다.
    pub fn off(&self, event_type: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.lock_listeners();
        let Some(list) = listeners.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event_type);
        }
        removed
    }

    /// 여러 이벤트 종류를 하나의 수신 채널로 모은다. 반환값을 drop하면 리스너도 해제된다.
    pub fn subscribe(&self, event_types: &[&str]) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let ids = event_types
            .iter()
            .map(|event_type| {
                let tx = tx.clone();
                let id = self.on(event_type, move |event| {
                    tx.send(event.clone())
                        .map_err(|_| anyhow::anyhow!("구독 수신자가 이미 종료되었습니다."))
                });
                (event_type.to_string(), id)
            })
            .collect();
        EventSubscription {
            channel: self.clone(),
            ids,
            rx,
        }
    }

    /// 전송로가 닫혔는지 여부이다.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// 전송로가 닫힐 때까지 기다린다.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// 현재 응답을 기다리는 요청 수이다.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelInner {
    fn lock_listeners(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerId, EventListener)>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 수신한 한 줄을 분류해 응답 완료 또는 이벤트 전달로 라우팅한다.
    fn dispatch_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match classify_line(line) {
            Ok(InboundMessage::Response(response)) => self.complete(response),
            Ok(InboundMessage::Event(event)) => self.emit(&event),
            Err(err) => warn!(error = %err, line, "수신 메시지를 버립니다."),
        }
    }

    fn complete(&self, response: ResponseMessage) {
        let ResponseMessage { id, outcome } = response;
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(outcome.map_err(ChannelError::RemoteAction));
            }
            None => warn!(%id, "대기 중이 아닌 요청의 응답을 버립니다."),
        }
    }

    /// 리스너 목록을 복제한 뒤 잠금 밖에서 하나씩 호출한다.
    fn emit(&self, event: &ChannelEvent) {
        let listeners: Vec<EventListener> = self
            .lock_listeners()
            .get(&event.event)
            .map(|list| list.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default();
        if listeners.is_empty() {
            debug!(event = %event.event, "리스너 없는 이벤트");
            return;
        }
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(event = %event.event, error = %err, "이벤트 리스너 실패"),
                Err(_) => error!(event = %event.event, "이벤트 리스너 패닉"),
            }
        }
    }

    /// 대기 중인 모든 요청을 실패시키고 exit 이벤트를 한 번 발생시킨다.
    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.cancel();
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut rejected = 0usize;
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(ChannelError::ServiceUnavailable));
                rejected += 1;
            }
        }
        info!(rejected, "네이티브 서비스 연결이 종료되었습니다.");
        self.emit(&ChannelEvent::bare(EXIT_EVENT));
    }
}

/// 응답 대기가 끝나면(성공, 실패, 시간 초과, 취소 모두) 대기 항목을 정리한다.
struct PendingGuard<'a> {
    inner: &'a ChannelInner,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.remove(self.id);
    }
}

/// 여러 이벤트를 모아 받는 구독 핸들이다.
pub struct EventSubscription {
    channel: MessageChannel,
    ids: Vec<(String, ListenerId)>,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl EventSubscription {
    /// 다음 이벤트를 기다린다.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        for (event_type, id) in self.ids.drain(..) {
            self.channel.off(&event_type, id);
        }
    }
}

/// 단일 reader가 도착 순서대로 메시지를 처리한다. EOF나 I/O 오류에서만 채널을 종료한다.
///
/// 줄은 바이트로 자르고 UTF-8 변환은 줄마다 따로 한다. 깨진 줄은 그 줄만 버린다.
async fn read_loop<R>(inner: Arc<ChannelInner>, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let codec = AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec());
    let mut frames = FramedRead::new(reader, codec);
    while let Some(frame_result) = frames.next().await {
        match frame_result {
            Ok(frame) => match String::from_utf8(frame.to_vec()) {
                Ok(line) => inner.dispatch_line(line.trim_end_matches('\r')),
                Err(err) => {
                    let err = ChannelError::Protocol(format!("UTF-8이 아닌 줄: {err}"));
                    warn!(error = %err, "수신 메시지를 버립니다.");
                }
            },
            Err(err) => {
                error!(error = %err, "수신 스트림 읽기 오류");
                break;
            }
        }
    }
    inner.shutdown();
}

/// 요청 줄을 순서대로 기록한다. 쓰기 실패 시 채널을 종료한다.
async fn write_loop<W>(
    inner: Arc<ChannelInner>,
    writer: W,
    mut outbound: mpsc::UnboundedReceiver<String>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    loop {
        tokio::select! {
            _ = inner.closed.cancelled() => break,
            next = outbound.recv() => {
                let Some(line) = next else { break };
                if let Err(err) = sink.send(line).await {
                    error!(error = %err, "요청 쓰기 실패");
                    inner.shutdown();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    /// 테스트용 가짜 네이티브 서비스 끝단이다.
    pub(crate) struct FakeService {
        lines: FramedRead<ReadHalf<DuplexStream>, LinesCodec>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeService {
        /// 다음 요청 한 줄을 JSON으로 읽는다.
        pub(crate) async fn next_request(&mut self) -> Value {
            let line = self
                .lines
                .next()
                .await
                .expect("요청 스트림 종료")
                .expect("요청 읽기 실패");
            serde_json::from_str(&line).expect("요청 JSON 파싱 실패")
        }

        /// 한 줄을 그대로 보낸다.
        pub(crate) async fn send_raw(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .expect("쓰기 실패");
        }

        /// 임의 바이트를 줄바꿈과 함께 보낸다.
        pub(crate) async fn send_bytes(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.expect("쓰기 실패");
            self.writer.write_all(b"\n").await.expect("쓰기 실패");
        }

        /// JSON 값을 한 줄로 보낸다.
        pub(crate) async fn send(&mut self, value: Value) {
            self.send_raw(&value.to_string()).await;
        }

        /// 성공 응답을 보낸다.
        pub(crate) async fn reply_ok(&mut self, id: &Value, result: Value) {
            self.send(json!({"id": id, "success": true, "result": result}))
                .await;
        }
    }

    pub(crate) fn connect_pair(timeout: Duration) -> (MessageChannel, FakeService) {
        let (client_side, service_side) = tokio::io::duplex(16 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let channel = MessageChannel::connect(client_read, client_write, timeout);
        let (service_read, service_write) = tokio::io::split(service_side);
        let service = FakeService {
            lines: FramedRead::new(service_read, LinesCodec::new()),
            writer: service_write,
        };
        (channel, service)
    }

    #[tokio::test]
    async fn responses_are_matched_by_id_not_arrival_order() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let first = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .request("getPixelColor", Some(json!({"x": 1})))
                    .await
            })
        };
        let r1 = service.next_request().await;
        let second = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .request("getPixelColor", Some(json!({"x": 2})))
                    .await
            })
        };
        let r2 = service.next_request().await;
        assert_ne!(r1["id"], r2["id"]);

        service.reply_ok(&r2["id"], json!("second")).await;
        service.reply_ok(&r1["id"], json!("first")).await;

        assert_eq!(first.await.expect("join 실패"), Ok(json!("first")));
        assert_eq!(second.await.expect("join 실패"), Ok(json!("second")));
        assert_eq!(channel.pending_requests(), 0);
    }

    #[tokio::test]
    async fn error_response_rejects_with_remote_message() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.request("executeClick", None).await })
        };
        let req = service.next_request().await;
        assert_eq!(req["method"], "executeClick");
        assert!(req.get("params").is_none());
        service
            .send(json!({"id": req["id"], "success": false, "error": "permission denied"}))
            .await;
        assert_eq!(
            call.await.expect("join 실패"),
            Err(ChannelError::RemoteAction("permission denied".into()))
        );
    }

    #[tokio::test]
    async fn timed_out_request_drops_late_response_and_channel_survives() {
        let (channel, mut service) = connect_pair(Duration::from_millis(50));
        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.request("waitForPixelState", None).await })
        };
        let late = service.next_request().await;
        let result = call.await.expect("join 실패");
        assert!(matches!(result, Err(ChannelError::RequestTimeout { .. })));
        assert_eq!(channel.pending_requests(), 0);

        service.reply_ok(&late["id"], json!(true)).await;

        let next = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .request_with_timeout("checkPermissions", None, Duration::from_secs(5))
                    .await
            })
        };
        let req = service.next_request().await;
        service.reply_ok(&req["id"], json!({"accessibility": true})).await;
        assert_eq!(
            next.await.expect("join 실패"),
            Ok(json!({"accessibility": true}))
        );
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn malformed_lines_are_discarded_without_closing() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        channel.on("keyPressed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let mut sub = channel.subscribe(&["keyPressed"]);

        service.send_raw("{broken").await;
        service.send(json!({"unexpected": true})).await;
        service
            .send(json!({"event": "keyPressed", "data": {"key": "a"}}))
            .await;

        let event = sub.recv().await.expect("이벤트 수신 실패");
        assert_eq!(event.data["key"], "a");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_discarded_and_pending_request_survives() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let pending = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.request("checkPermissions", None).await })
        };
        let request = service.next_request().await;

        service.send_bytes(b"\xff\xfe garbage").await;
        service
            .reply_ok(&request["id"], json!({"accessibility": true}))
            .await;

        assert_eq!(
            pending.await.expect("join 실패"),
            Ok(json!({"accessibility": true}))
        );
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_other_listeners() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        channel.on("mouseClicked", |_| anyhow::bail!("첫 리스너 실패"));
        channel.on("mouseClicked", |_| panic!("두 번째 리스너 패닉"));
        let mut sub = channel.subscribe(&["mouseClicked"]);

        service
            .send(json!({"event": "mouseClicked", "data": {"x": 3, "y": 4}}))
            .await;
        let event = sub.recv().await.expect("이벤트 수신 실패");
        assert_eq!(event.event, "mouseClicked");
    }

    #[tokio::test]
    async fn off_removes_listener() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = channel.on("overlayMoved", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(channel.off("overlayMoved", id));
        assert!(!channel.off("overlayMoved", id));

        let mut sub = channel.subscribe(&["overlayMoved"]);
        service.send(json!({"event": "overlayMoved", "data": {}})).await;
        sub.recv().await.expect("이벤트 수신 실패");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_close_rejects_pending_and_fires_exit() {
        let (channel, mut service) = connect_pair(DEFAULT_REQUEST_TIMEOUT);
        let mut exit = channel.subscribe(&[EXIT_EVENT]);
        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.request("executeKeypress", None).await })
        };
        service.next_request().await;
        drop(service);

        assert_eq!(
            call.await.expect("join 실패"),
            Err(ChannelError::ServiceUnavailable)
        );
        assert_eq!(exit.recv().await.map(|e| e.event), Some(EXIT_EVENT.to_string()));
        channel.closed().await;
        assert_eq!(
            channel.request("executeKeypress", None).await,
            Err(ChannelError::ServiceUnavailable)
        );
    }
}
