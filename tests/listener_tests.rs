//! Integration tests for the listener.
//!
//! These drive the whole pipeline (snapshot, diff, classify, extract, publish)
//! through the scripted automation backend.

use chat_listener::{
    Config, EventPublisher, ForwardedItem, ListenError, Listener, Message, MessageKind,
    OriginKind, ReplayScript, ScriptedAutomation, ScriptedMessage, ScriptedWindow, Selector,
    SenderKind, Side, SourceKind, WindowRef, WorkerState,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    automation: Arc<ScriptedAutomation>,
    listener: Arc<Listener>,
    received: Arc<Mutex<Vec<Message>>>,
    dir: TempDir,
}

impl Harness {
    fn new(windows: Vec<ScriptedWindow>) -> Self {
        Self::with_config(windows, |_| {})
    }

    fn with_config(windows: Vec<ScriptedWindow>, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.timing.settle_delay_ms = 0;
        config.timing.cycle_interval_ms = 5;
        config.timing.retry_interval_ms = 1;
        config.timing.save_dialog_timeout_ms = 30;
        config.storage.save_dir = dir.path().join("media");
        tweak(&mut config);

        let automation = Arc::new(ScriptedAutomation::new(
            ReplayScript { windows },
            &config.timing,
        ));
        let publisher = Arc::new(EventPublisher::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        publisher.on_message(move |message, _| sink.lock().unwrap().push(message.clone()));

        let listener = Arc::new(Listener::new(config, automation.clone(), publisher));
        Self {
            automation,
            listener,
            received,
            dir,
        }
    }

    fn windows(&self) -> Vec<WindowRef> {
        self.automation.window_refs()
    }

    async fn register_all(&self) {
        self.listener.register(self.windows()).await.unwrap();
    }

    fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    fn contents(&self) -> Vec<Vec<String>> {
        self.received().into_iter().map(|m| m.content).collect()
    }

    async fn wait_for_messages(&self, count: usize) {
        for _ in 0..200 {
            if self.received.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} messages, got {:?}", count, self.contents());
    }
}

fn friend(label: &str) -> ScriptedMessage {
    ScriptedMessage::text_from(label, "Alice")
}

#[tokio::test]
async fn test_text_then_image_end_to_end() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("hello")])
        .frame(vec![
            friend("hello"),
            friend("how are you"),
            ScriptedMessage::new("[图片]")
                .from_friend("Alice")
                .with_file("photo.png"),
        ])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    let received = harness.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].kind, MessageKind::Text);
    assert_eq!(received[0].content, vec!["how are you"]);
    assert_eq!(received[0].sender_kind, SenderKind::Friend);
    assert_eq!(received[0].origin_kind, OriginKind::Single);
    assert_eq!(received[0].sender_name, "Alice");
    assert_eq!(received[0].origin_window, "Alice");

    let saved = harness.dir.path().join("media").join("photo.png");
    assert_eq!(received[1].kind, MessageKind::Image);
    assert_eq!(received[1].content, vec![saved.to_string_lossy().into_owned()]);
    assert!(saved.exists());

    assert_eq!(
        harness.listener.last_snapshot("Alice").await.unwrap(),
        vec!["hello", "how are you", "[图片]"]
    );
}

#[tokio::test]
async fn test_baseline_is_never_delivered() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice").frame(vec![
        friend("old"),
        friend("older"),
    ])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();
    harness.listener.poll_cycle().await.unwrap();

    assert!(harness.received().is_empty());
}

#[tokio::test]
async fn test_repeated_message_delivered_once() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("ok"), friend("X")])
        .frame(vec![friend("ok"), friend("X"), friend("X")])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();
    harness.listener.poll_cycle().await.unwrap();
    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.contents(), vec![vec!["X".to_string()]]);
}

#[tokio::test]
async fn test_message_after_duplicate_boundary() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("A"), friend("X")])
        .frame(vec![friend("A"), friend("X"), friend("X"), friend("Y")])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.contents(), vec![vec!["Y".to_string()]]);
}

#[tokio::test]
async fn test_self_messages_skip_filtered_subscribers() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice").frame(vec![]).frame(vec![
        ScriptedMessage::own_text("mine", "Me"),
        friend("theirs"),
    ])]);
    let others = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&others);
    harness
        .listener
        .publisher()
        .on_message_without_self(move |m, _| sink.lock().unwrap().push(m.content[0].clone()));
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    let received = harness.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].sender_kind, SenderKind::Myself);
    assert!(received[0].is_self());
    // Own messages never carry the window title as sender name
    assert_eq!(received[0].origin_kind, OriginKind::Group);
    assert_eq!(*others.lock().unwrap(), vec!["theirs"]);
}

#[tokio::test]
async fn test_group_origin() {
    let harness = Harness::new(vec![ScriptedWindow::new("Book club")
        .frame(vec![])
        .frame(vec![ScriptedMessage::text_from("chapter 3?", "Bob")])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    let received = harness.received();
    assert_eq!(received[0].origin_kind, OriginKind::Group);
    assert_eq!(received[0].sender_name, "Bob");
}

#[tokio::test]
async fn test_system_messages() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice").frame(vec![]).frame(vec![
        ScriptedMessage::new("").with_child(Selector::SystemNotice, "Alice patted you"),
        ScriptedMessage::new("Alice recalled a message"),
    ])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    let received = harness.received();
    assert_eq!(received.len(), 2);
    for message in &received {
        assert_eq!(message.source_kind, SourceKind::System);
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.sender_kind, SenderKind::Myself);
        assert_eq!(message.origin_kind, OriginKind::Single);
        assert_eq!(message.sender_name, "System");
    }
    assert_eq!(
        harness.contents(),
        vec![
            vec!["Alice patted you".to_string()],
            vec!["Alice recalled a message".to_string()]
        ]
    );
}

#[tokio::test]
async fn test_every_kind_is_extracted() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice").frame(vec![]).frame(vec![
        ScriptedMessage::new("Order status")
            .from_friend("Alice")
            .with_child(Selector::MiniProgramSign(Side::Other), "小程序")
            .with_child(Selector::MiniProgramTitle(Side::Other), "Tickets")
            .with_child(Selector::MiniProgramBody(Side::Other), "Seat 12A"),
        ScriptedMessage::new("微信转账")
            .from_friend("Alice")
            .with_child(Selector::TransferSign(Side::Other), "微信转账")
            .with_child(Selector::TransferAmount(Side::Other), "¥88.00"),
        ScriptedMessage::new("sounds good\n引用  的消息 : dinner at 7?")
            .from_friend("Alice")
            .with_child(Selector::QuoteSender, "Bob : dinner at 7?"),
        ScriptedMessage::new("[语音]3\"")
            .from_friend("Alice")
            .with_transcript("on my way", 2),
        ScriptedMessage::new("[聊天记录]")
            .from_friend("Alice")
            .with_forwarded(vec![
                ForwardedItem {
                    label: "Bob see you 09:00".to_string(),
                    text: Some("see you".to_string()),
                },
                ForwardedItem {
                    label: "Bob[图片]09:01".to_string(),
                    text: None,
                },
                ForwardedItem {
                    label: "Bob 09:02".to_string(),
                    text: None,
                },
            ]),
        ScriptedMessage::new("[视频]")
            .from_friend("Alice")
            .with_file("clip.mp4"),
        ScriptedMessage::new("[动画表情]").from_friend("Alice"),
    ])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    let received = harness.received();
    let kinds: Vec<MessageKind> = received.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageKind::MiniProgramCard,
            MessageKind::Transfer,
            MessageKind::Quote,
            MessageKind::Voice,
            MessageKind::MergeForward,
            MessageKind::Video,
            MessageKind::Emoji,
        ]
    );
    assert_eq!(received[0].content, vec!["Tickets", "Seat 12A"]);
    assert_eq!(received[1].content, vec!["¥88.00"]);
    assert_eq!(received[2].content, vec!["sounds good", "dinner at 7?", "Bob"]);
    assert_eq!(received[3].content, vec!["on my way"]);
    assert_eq!(
        received[4].content,
        vec![
            "user [Bob] at [09:00] said: see you",
            "user [Bob] at [09:01] sent: [图片]",
        ]
    );
    assert!(received[5].content[0].ends_with("clip.mp4"));
    // base64 of the PNG signature
    assert!(received[6].content[0].starts_with("iVBORw0KGgo"));
}

#[tokio::test]
async fn test_failed_messages_are_skipped_and_snapshot_advances() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("hello")])
        .frame(vec![
            friend("hello"),
            ScriptedMessage::new("[位置]").from_friend("Alice"),
            ScriptedMessage::new("[文件]")
                .from_friend("Alice")
                .without_save_dialog(),
            ScriptedMessage::new("Order status")
                .from_friend("Alice")
                .with_child(Selector::MiniProgramSign(Side::Other), "小程序"),
            friend("after"),
        ])]);
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();
    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.contents(), vec![vec!["after".to_string()]]);
    assert_eq!(harness.listener.last_snapshot("Alice").await.unwrap().len(), 5);
    let status = harness.listener.status().await;
    assert_eq!(status.delivered_total, 1);
    assert_eq!(status.skipped_total, 3);
}

#[tokio::test]
async fn test_unwritable_save_dir_skips_only_the_media_message() {
    // A regular file where the save directory should be created
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let save_dir = blocker.path().join("media");
    let harness = Harness::with_config(
        vec![ScriptedWindow::new("Alice")
            .frame(vec![friend("hello")])
            .frame(vec![
                friend("hello"),
                ScriptedMessage::new("[图片]")
                    .from_friend("Alice")
                    .with_file("photo.png"),
                friend("after"),
            ])],
        move |config| config.storage.save_dir = save_dir,
    );
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.contents(), vec![vec!["after".to_string()]]);
    assert_eq!(
        harness.listener.last_snapshot("Alice").await.unwrap(),
        vec!["hello", "[图片]", "after"]
    );
    assert_eq!(harness.listener.status().await.skipped_total, 1);
}

#[tokio::test]
async fn test_lost_boundary_is_fatal() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("a")])
        .frame(vec![friend("b")])]);
    harness.register_all().await;

    let result = harness.listener.poll_cycle().await;
    assert!(matches!(result, Err(ListenError::SnapshotDiverged { .. })));
}

#[tokio::test]
async fn test_closed_window_is_fatal_by_default() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("a")])
        .closes_after(1)]);
    harness.register_all().await;

    let result = harness.listener.poll_cycle().await;
    assert!(matches!(result, Err(ListenError::WindowUnavailable(title)) if title == "Alice"));
}

#[tokio::test]
async fn test_closed_window_can_be_dropped() {
    let harness = Harness::with_config(
        vec![
            ScriptedWindow::new("Alice").frame(vec![friend("a")]).closes_after(1),
            ScriptedWindow::new("Bob")
                .frame(vec![])
                .frame(vec![ScriptedMessage::text_from("still here", "Bob")]),
        ],
        |config| config.listen.drop_unavailable_windows = true,
    );
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.listener.windows().await, vec!["Bob"]);
    assert_eq!(harness.contents(), vec![vec!["still here".to_string()]]);
}

#[tokio::test]
async fn test_windows_polled_in_registration_order() {
    let harness = Harness::new(vec![
        ScriptedWindow::new("Alice").frame(vec![]),
        ScriptedWindow::new("Bob").frame(vec![]),
    ]);
    harness.register_all().await;
    // Registering again is a no-op
    harness.register_all().await;

    harness.listener.poll_cycle().await.unwrap();

    assert_eq!(harness.automation.focus_log(), vec!["Alice", "Bob"]);
    assert_eq!(harness.listener.windows().await.len(), 2);
}

#[tokio::test]
async fn test_pause_holds_delivery_until_resume() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("hello")])
        .frame(vec![friend("hello"), friend("one"), friend("two")])]);

    // No worker yet, so the pause is acknowledged immediately
    harness.listener.pause().await;
    harness.listener.init_listen(harness.windows()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.received().is_empty());
    assert!(harness.automation.focus_log().is_empty());
    assert_eq!(harness.listener.status().await.worker, WorkerState::Suspended);

    harness.listener.resume();
    harness.wait_for_messages(2).await;
    assert_eq!(
        harness.contents(),
        vec![vec!["one".to_string()], vec!["two".to_string()]]
    );

    harness.listener.pause().await;
    assert_ne!(harness.listener.status().await.worker, WorkerState::Polling);
}

#[tokio::test]
async fn test_while_paused_borrows_the_window() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("hello")])
        .frame(vec![friend("hello"), friend("hi")])]);
    harness.listener.init_listen(harness.windows()).await.unwrap();
    harness.wait_for_messages(1).await;

    let control = harness.listener.pause_control();
    let worker_state = control
        .while_paused(async { harness.listener.status().await.worker })
        .await;

    assert_ne!(worker_state, WorkerState::Polling);
    assert_eq!(control.state(), chat_listener::RunState::Active);
}

#[tokio::test]
async fn test_worker_stops_on_fatal_error() {
    let harness = Harness::new(vec![ScriptedWindow::new("Alice")
        .frame(vec![friend("a")])
        .closes_after(1)]);
    harness.listener.init_listen(harness.windows()).await.unwrap();

    let worker = harness.listener.take_worker().unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result, Err(ListenError::WindowUnavailable(_))));
    assert_eq!(harness.listener.status().await.worker, WorkerState::Stopped);
    // A stopped worker never holds the UI
    harness.listener.pause().await;
}
