use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use rivalroll_core::{
    reel::idle_window, Action, Character, CustomIconMap, PlayerId, Roster, SessionError,
    SessionState, SlotWindow, SpinAnimation, SpinRng, SpinTiming, Transition,
};
use rivalroll_shared::{
    ActionResponse, ApiError, HistoryEntryView, PlayerView, SessionView, SlotView,
};

use crate::scheduler::{animation_now, SpinEvent, SpinTask};
use crate::store::KvStore;

#[derive(Default)]
struct Reel {
    spin_id: u64,
    window: Option<SlotWindow>,
    task: Option<SpinTask>,
}

impl Reel {
    /// Drops the running task, if any, and invalidates its pending events.
    fn stop(&mut self) {
        self.task = None;
        self.spin_id += 1;
    }
}

struct Live {
    state: SessionState,
    rng: SpinRng,
    icons: CustomIconMap,
    reels: HashMap<PlayerId, Reel>,
}

impl Live {
    fn reel(&mut self, player: PlayerId) -> &mut Reel {
        self.reels.entry(player).or_default()
    }

    /// Redraws the static decoration of an idle player around its selection.
    fn refresh_idle(&mut self, player: PlayerId) {
        let p = self.state.player(player);
        if p.spinning {
            return;
        }
        let window = p
            .selection
            .clone()
            .map(|sel| idle_window(self.state.roster(), &sel, &mut self.rng));
        self.reel(player).window = window;
    }
}

pub struct SessionService {
    live: Mutex<Live>,
    store: KvStore,
    timing: SpinTiming,
    events: mpsc::UnboundedSender<SpinEvent>,
}

impl SessionService {
    /// Restores persisted histories and icons and starts the event loop.
    pub async fn start(
        store: KvStore,
        roster: Roster,
        rng: SpinRng,
        timing: SpinTiming,
    ) -> Arc<Self> {
        let history_n = store.load_history(PlayerId::N).await;
        let history_s = store.load_history(PlayerId::S).await;
        let icons = store.load_icons().await;
        info!(
            roster = roster.len(),
            history_n = history_n.len(),
            history_s = history_s.len(),
            icons = icons.len(),
            "session restored"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            live: Mutex::new(Live {
                state: SessionState::with_histories(roster, history_n, history_s),
                rng,
                icons,
                reels: HashMap::new(),
            }),
            store,
            timing,
            events: tx,
        });
        tokio::spawn(run_events(Arc::downgrade(&service), rx));
        service
    }

    pub async fn snapshot(&self) -> SessionView {
        let live = self.live.lock().await;
        view(&live)
    }

    pub async fn roster(&self) -> Roster {
        self.live.lock().await.state.roster().clone()
    }

    pub async fn spin(&self, player: PlayerId) -> ActionResponse {
        let mut live = self.live.lock().await;
        let pool = live.state.candidates_for(player);
        let Live { state, rng, .. } = &mut *live;
        match state.apply(&Action::Spin(player), rng) {
            Ok(Transition::SpinStarted { target, .. }) => {
                info!(%player, target = %target.name, "spin started");
                self.launch(&mut live, player, target, &pool);
                accepted(&live)
            }
            Ok(other) => unexpected(&live, other),
            Err(err) => rejected(&live, err),
        }
    }

    pub async fn spin_both(&self) -> ActionResponse {
        let mut live = self.live.lock().await;
        let pool_n = live.state.candidates_for(PlayerId::N);
        let pool_s = live.state.candidates_for(PlayerId::S);
        let Live { state, rng, .. } = &mut *live;
        match state.apply(&Action::SpinBoth, rng) {
            Ok(Transition::BothStarted { n, s }) => {
                info!(n = %n.name, s = %s.name, "spin both started");
                self.launch(&mut live, PlayerId::N, n, &pool_n);
                self.launch(&mut live, PlayerId::S, s, &pool_s);
                accepted(&live)
            }
            Ok(other) => unexpected(&live, other),
            Err(err) => rejected(&live, err),
        }
    }

    pub async fn skip(&self, player: PlayerId) -> ActionResponse {
        let mut live = self.live.lock().await;
        let was_spinning = live.state.skip(player);
        let reel = live.reel(player);
        reel.stop();
        reel.window = None;
        live.refresh_idle(player.other());
        info!(%player, was_spinning, "player skipped");
        accepted(&live)
    }

    pub async fn purge(&self) -> ActionResponse {
        let mut live = self.live.lock().await;
        for player in PlayerId::ALL {
            let reel = live.reel(player);
            reel.stop();
            reel.window = None;
        }
        live.state.purge_all();
        for player in PlayerId::ALL {
            self.persist_history(&live, player).await;
        }
        info!("all histories purged");
        accepted(&live)
    }

    pub async fn icons(&self) -> CustomIconMap {
        self.live.lock().await.icons.clone()
    }

    pub async fn set_icon(&self, name: &str, data_url: String) -> Result<SessionView, ApiError> {
        let mut live = self.live.lock().await;
        if !live.state.roster().contains(name) {
            return Err(ApiError::NotFound(name.to_string()));
        }
        live.icons.set(name, data_url);
        self.persist_icons(&live).await;
        info!(character = name, "custom icon set");
        Ok(view(&live))
    }

    pub async fn remove_icon(&self, name: &str) -> Result<SessionView, ApiError> {
        let mut live = self.live.lock().await;
        if live.icons.remove(name).is_none() {
            return Err(ApiError::NotFound(name.to_string()));
        }
        self.persist_icons(&live).await;
        info!(character = name, "custom icon removed");
        Ok(view(&live))
    }

    fn launch(&self, live: &mut Live, player: PlayerId, target: Character, pool: &[Character]) {
        let Live {
            state, rng, reels, ..
        } = live;
        let animation = SpinAnimation::start(
            player,
            target,
            pool,
            state.roster(),
            self.timing,
            rng,
            animation_now(),
        );
        let reel = reels.entry(player).or_default();
        reel.stop();
        reel.task = Some(SpinTask::spawn(reel.spin_id, animation, self.events.clone()));
    }

    async fn handle_event(&self, event: SpinEvent) {
        let mut live = self.live.lock().await;
        let player = event.player();
        // stale spin ids belong to skipped, purged or replaced spins
        let current = live.reel(player).spin_id;
        match event {
            SpinEvent::Frame {
                spin_id, window, ..
            } => {
                if spin_id == current {
                    live.reel(player).window = Some(window);
                }
            }
            SpinEvent::Completed {
                spin_id, window, ..
            } => {
                if spin_id != current {
                    debug!(%player, spin_id, current, "dropping stale completion");
                    return;
                }
                debug!(%player, landed = %window.center.name, "spin landed");
                let timestamp = Utc::now().timestamp_millis();
                let Live { state, rng, .. } = &mut *live;
                match state.apply(&Action::Commit { player, timestamp }, rng) {
                    Ok(Transition::Committed { entry, .. }) => {
                        info!(%player, character = %entry.character_name, "selection committed");
                        live.reel(player).task = None;
                        for id in PlayerId::ALL {
                            live.refresh_idle(id);
                        }
                        self.persist_history(&live, player).await;
                        for id in PlayerId::ALL {
                            if live.state.is_exhausted(id) {
                                info!(player = %id, "pool exhausted");
                            }
                        }
                    }
                    Ok(other) => debug!(?other, "unexpected commit outcome"),
                    Err(err) => {
                        error!(%player, error = %err, "commit rejected");
                        live.reel(player).task = None;
                    }
                }
            }
        }
    }

    async fn persist_history(&self, live: &Live, player: PlayerId) {
        if let Err(err) = self
            .store
            .save_history(player, live.state.history(player))
            .await
        {
            error!(%player, error = %err, "failed to persist history");
        }
    }

    async fn persist_icons(&self, live: &Live) {
        if let Err(err) = self.store.save_icons(&live.icons).await {
            error!(error = %err, "failed to persist custom icons");
        }
    }
}

async fn run_events(service: Weak<SessionService>, mut rx: mpsc::UnboundedReceiver<SpinEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(service) = service.upgrade() else {
            break;
        };
        service.handle_event(event).await;
    }
    debug!("spin event loop stopped");
}

fn slot_view(window: Option<&SlotWindow>) -> SlotView {
    match window {
        Some(w) => SlotView {
            left: Some(w.left.name.clone()),
            center: Some(w.center.name.clone()),
            right: Some(w.right.name.clone()),
        },
        None => SlotView::default(),
    }
}

fn view(live: &Live) -> SessionView {
    let players = PlayerId::ALL
        .iter()
        .map(|&id| {
            let p = live.state.player(id);
            let theme = id.theme();
            PlayerView {
                id: id.to_string(),
                display_name: theme.display_name.to_string(),
                color: theme.color.to_string(),
                selection: p.selection.as_ref().map(|c| c.name.clone()),
                target: p.target.as_ref().map(|c| c.name.clone()),
                spinning: p.spinning,
                window: slot_view(live.reels.get(&id).and_then(|r| r.window.as_ref())),
                history: p
                    .history
                    .iter()
                    .map(|h| HistoryEntryView {
                        character_name: h.character_name.clone(),
                        timestamp: h.timestamp,
                    })
                    .collect(),
                exhausted: live.state.is_exhausted(id),
            }
        })
        .collect();
    SessionView {
        players,
        available: live
            .state
            .available_pool()
            .into_iter()
            .map(|c| c.name)
            .collect(),
        icons: live
            .icons
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn accepted(live: &Live) -> ActionResponse {
    ActionResponse {
        accepted: true,
        message: None,
        session: view(live),
    }
}

fn rejected(live: &Live, err: SessionError) -> ActionResponse {
    debug!(error = %err, empty_pool = err.is_empty_pool(), "action rejected");
    ActionResponse {
        accepted: false,
        message: Some(err.to_string()),
        session: view(live),
    }
}

fn unexpected(live: &Live, transition: Transition) -> ActionResponse {
    error!(?transition, "unexpected transition");
    ActionResponse {
        accepted: false,
        message: None,
        session: view(live),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    const SPIN: Duration = Duration::from_millis(300);
    const SETTLE: Duration = Duration::from_millis(700);

    async fn service(names: &[&str]) -> (Arc<SessionService>, KvStore) {
        let store = KvStore::in_memory().await.unwrap();
        let service = SessionService::start(
            store.clone(),
            Roster::new(names.iter().copied()),
            SpinRng::seeded(99),
            SpinTiming::with_total(SPIN),
        )
        .await;
        (service, store)
    }

    #[tokio::test]
    async fn spin_commits_after_duration_and_persists() {
        let (service, store) = service(&["A", "B", "C"]).await;
        let resp = service.spin(PlayerId::N).await;
        assert!(resp.accepted);
        let target = resp.session.player("N").unwrap().target.clone().unwrap();

        sleep(Duration::from_millis(100)).await;
        let mid = service.snapshot().await;
        assert!(mid.player("N").unwrap().spinning);
        assert!(mid.player("N").unwrap().window.center.is_some());

        sleep(SETTLE).await;
        let done = service.snapshot().await;
        let n = done.player("N").unwrap();
        assert!(!n.spinning);
        assert_eq!(n.selection.as_deref(), Some(target.as_str()));
        assert_eq!(n.window.center.as_deref(), Some(target.as_str()));
        assert_eq!(done.available.len(), 2);

        let stored = store.load_history(PlayerId::N).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].character_name, target);
    }

    #[tokio::test]
    async fn spin_while_spinning_is_rejected() {
        let (service, _) = service(&["A", "B", "C"]).await;
        assert!(service.spin(PlayerId::S).await.accepted);
        let again = service.spin(PlayerId::S).await;
        assert!(!again.accepted);
        assert!(again.message.unwrap().contains("already spinning"));
    }

    #[tokio::test]
    async fn skip_mid_spin_never_commits() {
        let (service, store) = service(&["A", "B", "C"]).await;
        assert!(service.spin(PlayerId::N).await.accepted);
        sleep(Duration::from_millis(50)).await;
        let resp = service.skip(PlayerId::N).await;
        assert!(resp.accepted);

        sleep(SETTLE).await;
        let view = service.snapshot().await;
        let n = view.player("N").unwrap();
        assert!(!n.spinning && n.selection.is_none() && n.target.is_none());
        assert!(n.history.is_empty());
        assert_eq!(view.available.len(), 3);
        assert!(store.load_history(PlayerId::N).await.is_empty());
    }

    #[tokio::test]
    async fn spin_both_then_purge() {
        let (service, store) = service(&["A", "B", "C", "D"]).await;
        let resp = service.spin_both().await;
        assert!(resp.accepted);
        let n = resp.session.player("N").unwrap().target.clone();
        let s = resp.session.player("S").unwrap().target.clone();
        assert_ne!(n, s);

        sleep(SETTLE).await;
        let view = service.snapshot().await;
        assert_eq!(view.available.len(), 2);
        assert_eq!(store.load_history(PlayerId::S).await.len(), 1);

        let purged = service.purge().await.session;
        assert_eq!(purged.available.len(), 4);
        assert!(purged.players.iter().all(|p| p.history.is_empty() && p.selection.is_none()));
        assert!(store.load_history(PlayerId::N).await.is_empty());

        let again = service.purge().await.session;
        assert_eq!(again, purged);
    }

    #[tokio::test]
    async fn purge_mid_spin_cancels() {
        let (service, _) = service(&["A", "B", "C"]).await;
        assert!(service.spin_both().await.accepted);
        sleep(Duration::from_millis(20)).await;
        service.purge().await;
        sleep(SETTLE).await;
        let view = service.snapshot().await;
        assert_eq!(view.available.len(), 3);
        assert!(view.players.iter().all(|p| !p.spinning && p.window == SlotView::default()));
    }

    #[tokio::test]
    async fn exhausted_pool_rejects_spin() {
        let (service, _) = service(&["A"]).await;
        assert!(!service.spin_both().await.accepted);
        assert!(service.spin(PlayerId::N).await.accepted);
        sleep(SETTLE).await;
        let resp = service.spin(PlayerId::S).await;
        assert!(!resp.accepted);
        assert!(resp.session.players.iter().all(|p| p.exhausted));
    }

    #[tokio::test]
    async fn histories_are_restored_on_start() {
        let store = KvStore::in_memory().await.unwrap();
        store
            .save_history(
                PlayerId::S,
                &[rivalroll_core::HistoryEntry {
                    character_name: "B".into(),
                    timestamp: 1,
                }],
            )
            .await
            .unwrap();
        let service = SessionService::start(
            store,
            Roster::new(["A", "B"]),
            SpinRng::seeded(1),
            SpinTiming::default(),
        )
        .await;
        assert_eq!(service.snapshot().await.available, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn icons_only_for_roster_characters() {
        let (service, store) = service(&["Hela", "Thor"]).await;
        let view = service
            .set_icon("Hela", "data:image/png;base64,AA==".into())
            .await
            .unwrap();
        assert!(view.icons.contains_key("Hela"));
        assert!(matches!(
            service.set_icon("Nobody", "x".into()).await,
            Err(ApiError::NotFound(_))
        ));
        assert_eq!(store.load_icons().await.len(), 1);
        service.remove_icon("Hela").await.unwrap();
        assert!(store.load_icons().await.is_empty());
        assert!(service.remove_icon("Hela").await.is_err());
    }

    #[tokio::test]
    async fn committed_window_is_redrawn_around_selection() {
        let (service, _) = service(&["A", "B", "C", "D"]).await;
        let resp = service.spin(PlayerId::N).await;
        let target = resp.session.player("N").unwrap().target.clone().unwrap();
        let spin_id = service.live.lock().await.reel(PlayerId::N).spin_id;

        service
            .handle_event(SpinEvent::Completed {
                player: PlayerId::N,
                spin_id,
                window: SlotWindow {
                    left: Character::placeholder(),
                    center: Character::new(target.clone()),
                    right: Character::placeholder(),
                },
            })
            .await;

        let view = service.snapshot().await;
        let n = view.player("N").unwrap();
        assert!(!n.spinning);
        assert_eq!(n.selection.as_deref(), Some(target.as_str()));
        assert_eq!(n.window.center.as_deref(), Some(target.as_str()));
        for side in [&n.window.left, &n.window.right] {
            let side = side.as_deref().unwrap();
            assert_ne!(side, "?");
            assert_ne!(side, target);
        }
    }
}
