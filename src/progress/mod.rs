//! 터미널 스피너
//!
//! 턴 처리 중 stderr에 점자 스피너를 그립니다.
//! stderr가 터미널이 아니면 아무것도 출력하지 않습니다.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub const SPINNER_FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
pub const FRAME_INTERVAL: Duration = Duration::from_millis(80);
pub const DEFAULT_LABEL: &str = "Generating answer...";

/// 실행 중인 스피너
#[derive(Debug)]
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// 스피너 시작 (터미널이 아니면 비활성)
    pub fn start(label: &str) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::disabled();
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let label = label.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_INTERVAL);
            let mut frame = 0usize;
            while flag.load(Ordering::Relaxed) {
                interval.tick().await;
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "\r{} {}", SPINNER_FRAMES[frame], label);
                let _ = stderr.flush();
                frame = (frame + 1) % SPINNER_FRAMES.len();
            }
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// 아무것도 그리지 않는 스피너
    pub fn disabled() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// 정지 후 줄 지우기
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\r\x1b[K");
            let _ = stderr.flush();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
