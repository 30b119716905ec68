use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use atlas_core::{ChapterFetchCoordinator, Config, LibraryManager, ProgressTracker, ReaderSession};

use crate::api::WsBroadcaster;

struct SessionEntry {
    session: Arc<ReaderSession>,
    last_used: Instant,
}

/// Shared application state
pub struct AppState {
    config: Config,
    library: Arc<LibraryManager>,
    coordinator: ChapterFetchCoordinator,
    tracker: ProgressTracker,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: ChapterFetchCoordinator,
        tracker: ProgressTracker,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            library: Arc::clone(coordinator.library()),
            coordinator,
            tracker,
            sessions: RwLock::new(HashMap::new()),
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &Arc<LibraryManager> {
        &self.library
    }

    pub fn coordinator(&self) -> &ChapterFetchCoordinator {
        &self.coordinator
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }

    pub async fn insert_session(&self, session_id: String, session: ReaderSession) {
        self.sessions.write().await.insert(
            session_id,
            SessionEntry {
                session: Arc::new(session),
                last_used: Instant::now(),
            },
        );
    }

    /// Look up a session and mark it as used.
    pub async fn session(&self, session_id: &str) -> Option<Arc<ReaderSession>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<ReaderSession>> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|entry| entry.session)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close sessions unused for at least `idle`, writing their pending
    /// progress. Returns the number closed.
    pub async fn close_idle_sessions(&self, idle: Duration) -> usize {
        let expired: Vec<(String, Arc<ReaderSession>)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() >= idle)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.session)))
                .collect()
        };

        for (session_id, session) in &expired {
            if let Err(e) = self.tracker.flush_novel(session.novel_id()).await {
                warn!(session_id = %session_id, "Failed to flush progress of idle session: {}", e);
            }
            info!(session_id = %session_id, novel_id = %session.novel_id(), "Idle reader session closed");
        }
        expired.len()
    }
}

/// Periodically close idle reader sessions.
///
/// Runs until aborted.
pub async fn reap_idle_sessions(state: Arc<AppState>, idle: Duration) {
    let poll_interval = (idle / 4).max(Duration::from_secs(1));
    loop {
        tokio::time::sleep(poll_interval).await;
        state.close_idle_sessions(idle).await;
    }
}
