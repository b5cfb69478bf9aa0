//! Live projections of the local store into player state
//!
//! A [`Projection`] runs one background task per projected collection. The
//! task registers observers on the store queries its [`Projector`] depends
//! on; any change to them re-runs the full projection, publishes the new
//! view and emits the matching [`AppEvent`]. Without a session the view is
//! cleared to its default and no query runs.

use crate::error::Result;
use crate::types::{list_id, HistoryEntry, MusicInfo, UserList};
use async_trait::async_trait;
use cadence_core::{
    AppEvent, DislikedSong, EventDispatcher, FavoriteSong, PlayRecord, Playlist, PlaylistSong,
    SessionContext,
};
use cadence_storage::{
    disliked_songs, favorites, play_history, playlist_songs, playlists, LocalStore, LocalTable,
    ObserverHandle, Query,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Number of plays kept in the history view
pub const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Turns store rows into one player-facing view
#[async_trait]
pub trait Projector: Send + Sync + 'static {
    type View: Clone + Default + PartialEq + Send + Sync + 'static;

    /// Name used in logs
    const NAME: &'static str;

    /// Build the complete view for `user_id`
    async fn project(&self, store: &LocalStore, user_id: &str) -> Result<Self::View>;

    /// Observe every query the view depends on, poking `notify` on change
    fn watch(&self, store: &LocalStore, user_id: &str, notify: &Arc<Notify>)
        -> Vec<ObserverHandle>;

    /// Event announcing a freshly projected view
    fn event(view: &Self::View) -> AppEvent;
}

/// Observer that only signals; the projector re-reads everything it needs
fn poke<T: LocalTable>(store: &LocalStore, query: Query<T>, notify: &Arc<Notify>) -> ObserverHandle {
    let notify = Arc::clone(notify);
    store.observe_with(query, move |_rows| notify.notify_one())
}

/// A running projection
///
/// The background task stops when the projection is dropped.
pub struct Projection<P: Projector> {
    view: watch::Receiver<P::View>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl<P: Projector> Projection<P> {
    /// Start projecting with `projector`
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        projector: P,
        store: LocalStore,
        session: SessionContext,
        events: EventDispatcher<AppEvent>,
    ) -> Self {
        let (tx, view) = watch::channel(P::View::default());
        let refresh = Arc::new(Notify::new());

        let task = tokio::spawn(run(
            projector,
            store,
            session,
            events,
            tx,
            Arc::clone(&refresh),
        ));

        Self {
            view,
            refresh,
            task,
        }
    }

    /// Latest projected view
    pub fn current(&self) -> P::View {
        self.view.borrow().clone()
    }

    /// Receiver woken on every new view
    pub fn subscribe(&self) -> watch::Receiver<P::View> {
        self.view.clone()
    }

    /// Re-run the projection even if nothing changed
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }
}

impl<P: Projector> Drop for Projection<P> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<P: Projector>(
    projector: P,
    store: LocalStore,
    session: SessionContext,
    events: EventDispatcher<AppEvent>,
    view: watch::Sender<P::View>,
    notify: Arc<Notify>,
) {
    let mut session_rx = session.watch();

    loop {
        let user_id = session_rx
            .borrow_and_update()
            .as_ref()
            .map(|s| s.user_id.clone());

        // Dropped when the session changes, which stops the observers
        let _observers = match &user_id {
            Some(user_id) => projector.watch(&store, user_id, &notify),
            None => Vec::new(),
        };

        loop {
            let projected = match &user_id {
                Some(user_id) => match projector.project(&store, user_id).await {
                    Ok(projected) => Some(projected),
                    Err(e) => {
                        warn!(projection = P::NAME, error = %e, "Projection failed");
                        None
                    }
                },
                None => Some(P::View::default()),
            };

            if let Some(projected) = projected {
                let event = P::event(&projected);
                view.send_replace(projected);
                debug!(projection = P::NAME, ?event, "Projection updated");
                events.emit(&event);
            }

            tokio::select! {
                () = notify.notified() => {}
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}

/// The user's playlists and the songs of each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistView {
    /// Visible playlists, oldest first
    pub lists: Vec<UserList>,
    /// Songs in play order, keyed by [`UserList::id`]
    pub songs: HashMap<String, Vec<MusicInfo>>,
}

impl PlaylistView {
    pub fn songs_of(&self, list_id: &str) -> &[MusicInfo] {
        self.songs.get(list_id).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaylistProjector;

#[async_trait]
impl Projector for PlaylistProjector {
    type View = PlaylistView;

    const NAME: &'static str = "playlists";

    async fn project(&self, store: &LocalStore, user_id: &str) -> Result<PlaylistView> {
        let mut view = PlaylistView::default();

        for playlist in playlists::list_for_user(store, user_id).await? {
            let entries = playlist_songs::list(store, &playlist.id).await?;
            view.songs.insert(
                list_id(&playlist.id),
                entries.iter().map(MusicInfo::from).collect(),
            );
            view.lists.push(UserList::from(&playlist));
        }

        Ok(view)
    }

    fn watch(&self, store: &LocalStore, user_id: &str, notify: &Arc<Notify>) -> Vec<ObserverHandle> {
        vec![
            poke(store, store.query::<Playlist>().eq("user_id", user_id), notify),
            poke(store, store.query::<PlaylistSong>().eq("user_id", user_id), notify),
        ]
    }

    fn event(view: &PlaylistView) -> AppEvent {
        AppEvent::PlaylistsUpdated {
            count: view.lists.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FavoritesProjector;

#[async_trait]
impl Projector for FavoritesProjector {
    type View = Vec<MusicInfo>;

    const NAME: &'static str = "favorites";

    async fn project(&self, store: &LocalStore, user_id: &str) -> Result<Vec<MusicInfo>> {
        let rows = favorites::list(store, user_id).await?;
        Ok(rows.iter().map(MusicInfo::from).collect())
    }

    fn watch(&self, store: &LocalStore, user_id: &str, notify: &Arc<Notify>) -> Vec<ObserverHandle> {
        vec![poke(store, store.query::<FavoriteSong>().eq("user_id", user_id), notify)]
    }

    fn event(view: &Vec<MusicInfo>) -> AppEvent {
        AppEvent::FavoritesUpdated { count: view.len() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryProjector {
    /// Most recent plays to keep
    pub limit: i64,
}

impl Default for HistoryProjector {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[async_trait]
impl Projector for HistoryProjector {
    type View = Vec<HistoryEntry>;

    const NAME: &'static str = "history";

    async fn project(&self, store: &LocalStore, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows = play_history::list_recent(store, user_id, self.limit).await?;
        Ok(rows.iter().map(HistoryEntry::from).collect())
    }

    fn watch(&self, store: &LocalStore, user_id: &str, notify: &Arc<Notify>) -> Vec<ObserverHandle> {
        vec![poke(store, store.query::<PlayRecord>().eq("user_id", user_id), notify)]
    }

    fn event(view: &Vec<HistoryEntry>) -> AppEvent {
        AppEvent::PlayHistoryUpdated { count: view.len() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DislikesProjector;

#[async_trait]
impl Projector for DislikesProjector {
    type View = Vec<MusicInfo>;

    const NAME: &'static str = "dislikes";

    async fn project(&self, store: &LocalStore, user_id: &str) -> Result<Vec<MusicInfo>> {
        let rows = disliked_songs::list(store, user_id).await?;
        Ok(rows.iter().map(MusicInfo::from).collect())
    }

    fn watch(&self, store: &LocalStore, user_id: &str, notify: &Arc<Notify>) -> Vec<ObserverHandle> {
        vec![poke(store, store.query::<DislikedSong>().eq("user_id", user_id), notify)]
    }

    fn event(view: &Vec<MusicInfo>) -> AppEvent {
        AppEvent::DislikesUpdated { count: view.len() }
    }
}

pub type PlaylistProjection = Projection<PlaylistProjector>;
pub type FavoritesProjection = Projection<FavoritesProjector>;
pub type HistoryProjection = Projection<HistoryProjector>;
pub type DislikesProjection = Projection<DislikesProjector>;

impl PlaylistProjection {
    pub fn start(store: LocalStore, session: SessionContext, events: EventDispatcher<AppEvent>) -> Self {
        Self::spawn(PlaylistProjector, store, session, events)
    }
}

impl FavoritesProjection {
    pub fn start(store: LocalStore, session: SessionContext, events: EventDispatcher<AppEvent>) -> Self {
        Self::spawn(FavoritesProjector, store, session, events)
    }
}

impl HistoryProjection {
    pub fn start(store: LocalStore, session: SessionContext, events: EventDispatcher<AppEvent>) -> Self {
        Self::spawn(HistoryProjector::default(), store, session, events)
    }
}

impl DislikesProjection {
    pub fn start(store: LocalStore, session: SessionContext, events: EventDispatcher<AppEvent>) -> Self {
        Self::spawn(DislikesProjector, store, session, events)
    }
}
