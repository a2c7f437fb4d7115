//! End-to-end tests of the dispatch loop: events in, packets out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenroom::prelude::*;
use greenroom::{MATCHMAKE_PERMISSION, TheaterServerBuilder};
use greenroom_stats::{Hero, HeroStat, NewGame, StatPair, StatementFamily, StatsError};
use greenroom_transport::ClientOutbox;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =========================================================================
// Fakes
// =========================================================================

/// In-memory stand-in for the relational database. Records every call.
#[derive(Default)]
struct FakeDatabase {
    calls: Mutex<Vec<String>>,
    teams: Mutex<HashMap<u64, String>>,
    fail_add: AtomicBool,
    /// Milliseconds `add_game` takes.
    add_delay_ms: AtomicU64,
    fail_deletes: AtomicBool,
}

impl FakeDatabase {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    fn failure() -> StatsError {
        StatsError::EmptyBatch {
            family: StatementFamily::ServerStats,
        }
    }
}

impl GameDatabase for FakeDatabase {
    async fn hero(&self, hero_id: u64) -> Result<Option<Hero>, StatsError> {
        self.record(format!("hero:{hero_id}"));
        Ok(None)
    }

    async fn hero_stats(&self, hero_id: u64, keys: &[&str]) -> Result<Vec<HeroStat>, StatsError> {
        self.record(format!("hero_stats:{hero_id}"));
        let teams = self.teams.lock().unwrap();
        Ok(teams
            .get(&hero_id)
            .filter(|_| keys.contains(&"c_team"))
            .map(|team| HeroStat {
                user_id: 1,
                hero_id,
                hero_name: "hero".to_string(),
                key: "c_team".to_string(),
                value: team.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn add_game(&self, game: &NewGame) -> Result<(), StatsError> {
        self.record(format!("add_game:{}", game.gid));
        let delay = self.add_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        Ok(())
    }

    async fn game_player_joining(&self, gid: GameId, _shard: &Shard) -> Result<(), StatsError> {
        self.record(format!("joining:{gid}"));
        Ok(())
    }

    async fn game_player_entered(
        &self,
        gid: GameId,
        _shard: &Shard,
        team: Team,
    ) -> Result<(), StatsError> {
        self.record(format!("entered:{gid}:{}", team.number()));
        Ok(())
    }

    async fn game_player_left(
        &self,
        gid: GameId,
        _shard: &Shard,
        team: Team,
    ) -> Result<(), StatsError> {
        self.record(format!("left:{gid}:{}", team.number()));
        Ok(())
    }

    async fn touch_game(&self, gid: GameId, _shard: &Shard) -> Result<(), StatsError> {
        self.record(format!("touch:{gid}"));
        Ok(())
    }

    async fn delete_game_stats(&self, gid: GameId) -> Result<u64, StatsError> {
        self.record(format!("delete_game_stats:{gid}"));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        Ok(0)
    }

    async fn delete_game(&self, gid: GameId, shard: &Shard) -> Result<u64, StatsError> {
        self.record(format!("delete_game:{gid}:{shard}"));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        Ok(1)
    }

    async fn set_server_stats(&self, gid: GameId, stats: &[StatPair]) -> Result<(), StatsError> {
        self.record(format!("server_stats:{gid}:{}", stats.len()));
        Ok(())
    }

    async fn set_player_stats(
        &self,
        gid: GameId,
        player_id: u64,
        stats: &[StatPair],
    ) -> Result<(), StatsError> {
        self.record(format!("player_stats:{gid}:{player_id}:{}", stats.len()));
        Ok(())
    }
}

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    tcp: mpsc::Sender<TcpEvent>,
    udp: mpsc::Sender<UdpEvent>,
    store: Arc<MemoryStore>,
    db: Arc<FakeDatabase>,
    registry: Arc<GameRegistry>,
    run: JoinHandle<Result<(), GreenroomError>>,
}

impl Harness {
    fn start() -> Self {
        Self::start_with(FakeDatabase::default())
    }

    fn start_with(db: FakeDatabase) -> Self {
        let mut config = ServerConfig::default();
        config.shard = Some("abc123".to_string());
        config.heartbeat.interval = Duration::from_secs(3600);

        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(db);
        let registry = Arc::new(GameRegistry::new());

        let server = TheaterServerBuilder::new()
            .config(config)
            .registry(Arc::clone(&registry))
            .build(
                Arc::clone(&store),
                Arc::clone(&db),
                StoreAuthorizer::new(Arc::clone(&store)),
            );

        let (tcp, tcp_rx) = mpsc::channel(16);
        let (udp, udp_rx) = mpsc::channel(16);
        let run = tokio::spawn(server.run(tcp_rx, udp_rx));

        Self {
            tcp,
            udp,
            store,
            db,
            registry,
            run,
        }
    }

    async fn connect(&self, id: u64) -> (Arc<Client>, ClientOutbox) {
        let addr: SocketAddr = format!("10.0.0.{id}:3659").parse().unwrap();
        let (client, outbox) = Client::new(ConnectionId::new(id), addr);
        self.tcp
            .send(TcpEvent::NewClient(Arc::clone(&client)))
            .await
            .unwrap();
        (client, outbox)
    }

    async fn send(&self, client: &Arc<Client>, command: Command) {
        self.tcp
            .send(TcpEvent::Command {
                client: Arc::clone(client),
                command,
            })
            .await
            .unwrap();
    }

    async fn close(&self, client: &Arc<Client>) {
        self.tcp
            .send(TcpEvent::Close(Arc::clone(client)))
            .await
            .unwrap();
    }

    /// Closes both channels and waits for the loop to finish.
    async fn shutdown(self) -> (Arc<MemoryStore>, Arc<FakeDatabase>, Arc<GameRegistry>) {
        drop(self.tcp);
        drop(self.udp);
        self.run.await.unwrap().unwrap();
        (self.store, self.db, self.registry)
    }
}

async fn next_packet(outbox: &mut ClientOutbox) -> Packet {
    tokio::time::timeout(Duration::from_secs(5), outbox.recv())
        .await
        .expect("timed out waiting for a packet")
        .expect("outbox closed")
}

async fn grant_matchmaking(store: &Arc<MemoryStore>, session_key: &str, user_id: &str) {
    store.set(session_key, "uID", user_id).await.unwrap();
    StoreAuthorizer::new(Arc::clone(store))
        .grant(user_id, MATCHMAKE_PERMISSION)
        .await
        .unwrap();
}

/// Waits until the fake database has seen `call`.
async fn wait_for_call(db: &FakeDatabase, call: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !db.called(call) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {call}"));
}

fn status() -> Command {
    Command::new("pnow")
        .with("TXN", "Status")
        .with("partition.partition", "/eagames/BFH")
}

async fn register_game(registry: &GameRegistry, gid: u64, owner: &Arc<Client>) {
    registry
        .insert(GameServer::new(GameId(gid)), Arc::clone(owner))
        .await
        .unwrap();
}

// =========================================================================
// Status
// =========================================================================

#[tokio::test]
async fn test_status_with_permission_returns_registered_game() {
    let harness = Harness::start();
    let (owner, _owner_outbox) = Client::new(ConnectionId::new(99), "10.0.0.99:1".parse().unwrap());
    register_game(&harness.registry, 7, &owner).await;
    grant_matchmaking(&harness.store, "session:1", "42").await;

    let (client, mut outbox) = harness.connect(1).await;
    harness.send(&client, status()).await;

    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.query, "pnow");
    assert_eq!(packet.flag, FrameFlag::FESL);
    assert_eq!(packet.answer.get("TXN"), Some("Status"));
    assert_eq!(packet.answer.get("id.partition"), Some("/eagames/BFH"));
    assert_eq!(packet.answer.get("sessionState"), Some("COMPLETE"));
    assert_eq!(packet.answer.get("props.{games}.0.gid"), Some("7"));
    assert_eq!(packet.answer.get("props.{games}.0.lid"), Some("1"));
    assert_eq!(packet.answer.get("props.{games}.[]"), Some("1"));
    assert_eq!(harness.registry.lookup_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_status_after_revoke_skips_registry_lookup() {
    let harness = Harness::start();
    let (owner, _owner_outbox) = Client::new(ConnectionId::new(99), "10.0.0.99:1".parse().unwrap());
    register_game(&harness.registry, 7, &owner).await;
    grant_matchmaking(&harness.store, "session:1", "42").await;

    let (client, mut outbox) = harness.connect(1).await;
    harness.send(&client, status()).await;
    next_packet(&mut outbox).await;
    assert_eq!(harness.registry.lookup_count(), 1);

    StoreAuthorizer::new(Arc::clone(&harness.store))
        .revoke("42", MATCHMAKE_PERMISSION)
        .await
        .unwrap();
    harness.send(&client, status()).await;

    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.answer.get("props.{games}.[]"), Some("0"));
    assert_eq!(packet.answer.get("props.{games}.0.gid"), None);
    assert_eq!(packet.answer.get("sessionState"), Some("COMPLETE"));
    assert_eq!(harness.registry.lookup_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_status_on_empty_registry_reports_no_games() {
    let harness = Harness::start();
    grant_matchmaking(&harness.store, "session:1", "42").await;

    let (client, mut outbox) = harness.connect(1).await;
    harness.send(&client, status()).await;

    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.answer.get("props.{games}.[]"), Some("0"));
    assert_eq!(harness.registry.lookup_count(), 1);

    harness.shutdown().await;
}

// =========================================================================
// Dispatch
// =========================================================================

#[tokio::test]
async fn test_unknown_verb_does_not_stop_the_loop() {
    let harness = Harness::start();
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, Command::new("XXXX").with("TID", "1")).await;
    harness.send(&client, Command::new("UBRA").with("TID", "2")).await;

    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.query, "UBRA");
    assert_eq!(packet.answer.get("TID"), Some("2"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_command_before_new_client_is_dropped() {
    let harness = Harness::start();
    let (client, mut outbox) = Client::new(ConnectionId::new(5), "10.0.0.5:1".parse().unwrap());

    harness.send(&client, Command::new("UBRA").with("TID", "1")).await;
    harness.shutdown().await;

    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_udp_echo_reports_peer_address() {
    let harness = Harness::start();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let peer_addr: SocketAddr = "203.0.113.9:4000".parse().unwrap();

    harness
        .udp
        .send(UdpEvent::Command {
            peer: UdpPeer::new(peer_addr, out_tx),
            command: Command::new("ECHO").with("TID", "3"),
        })
        .await
        .unwrap();

    let (to, packet) = tokio::time::timeout(Duration::from_secs(5), out_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(to, peer_addr);
    assert_eq!(packet.query, "ECHO");
    assert_eq!(packet.answer.get("IP"), Some("203.0.113.9"));
    assert_eq!(packet.answer.get("PORT"), Some("4000"));
    assert_eq!(packet.answer.get("TID"), Some("3"));

    harness.shutdown().await;
}

// =========================================================================
// Games
// =========================================================================

fn cgam() -> Command {
    Command::new("CGAM")
        .with("TID", "4")
        .with("PORT", "18567")
        .with("INT-IP", "192.168.0.2")
        .with("INT-PORT", "18567")
        .with("NAME", "[EU] Karkand")
        .with("MAX-PLAYERS", "16")
        .with("B-version", "1.46")
        .with("B-U-map", "strike_at_karkand")
}

#[tokio::test]
async fn test_cgam_allocates_gid_and_registers_owner() {
    let harness = Harness::start();
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, cgam()).await;

    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.query, "CGAM");
    assert_eq!(packet.answer.get("GID"), Some("1"));
    assert_eq!(packet.answer.get("MAX-PLAYERS"), Some("16"));
    assert_eq!(packet.answer.get("EKEY").map(str::len), Some(24));

    let game = harness.registry.get(GameId(1)).await.unwrap();
    assert_eq!(game.name, "[EU] Karkand");
    assert_eq!(game.map, "strike_at_karkand");
    assert_eq!(game.ext_ip, "10.0.0.1");
    assert_eq!(
        harness.registry.owner(GameId(1)).await.unwrap().id(),
        ConnectionId::new(1)
    );
    assert_eq!(
        harness.store.get("session:1", "gdata:GID").await.unwrap(),
        Some("1".to_string())
    );
    assert!(harness.db.called("add_game:1"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cgam_database_failure_registers_nothing() {
    let db = FakeDatabase::default();
    db.fail_add.store(true, Ordering::SeqCst);
    let harness = Harness::start_with(db);
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, cgam()).await;
    let (store, db, registry) = harness.shutdown().await;

    // The handler task may outlive the loop; wait for it to finish.
    wait_for_call(&db, "add_game:1").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(registry.is_empty().await);
    assert_eq!(store.get("session:1", "gdata:GID").await.unwrap(), None);
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_close_releases_game_even_when_database_fails() {
    let db = FakeDatabase::default();
    db.fail_deletes.store(true, Ordering::SeqCst);
    let harness = Harness::start_with(db);

    let (client, _outbox) = harness.connect(1).await;
    register_game(&harness.registry, 7, &client).await;
    harness.store.set("session:1", "gdata:GID", "7").await.unwrap();
    harness.store.set("gdata:7", "GID", "7").await.unwrap();

    harness.close(&client).await;
    let (store, db, registry) = harness.shutdown().await;

    assert!(!client.is_active());
    assert!(!registry.contains(GameId(7)).await);
    assert!(!store.contains("session:1"));
    assert!(!store.contains("gdata:7"));
    assert!(db.called("delete_game_stats:7"));
    assert!(db.called("delete_game:7:abc123"));
}

#[tokio::test]
async fn test_cgam_owner_closing_during_insert_leaves_no_game() {
    let db = FakeDatabase::default();
    db.add_delay_ms.store(200, Ordering::SeqCst);
    let harness = Harness::start_with(db);
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, cgam()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.close(&client).await;

    wait_for_call(&harness.db, "delete_game:1:abc123").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!harness.registry.contains(GameId(1)).await);
    assert!(!harness.store.contains("session:1"));
    assert!(!harness.store.contains("gdata:1"));
    assert!(harness.db.called("delete_game_stats:1"));
    assert!(outbox.try_recv().is_err());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cgam_registry_conflict_drops_new_row() {
    let harness = Harness::start();
    let (other, _other_outbox) = Client::new(ConnectionId::new(99), "10.0.0.99:1".parse().unwrap());
    register_game(&harness.registry, 1, &other).await;
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, cgam()).await;
    wait_for_call(&harness.db, "delete_game:1:abc123").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(
        harness.registry.owner(GameId(1)).await.unwrap().id(),
        ConnectionId::new(99)
    );
    assert_eq!(harness.store.get("session:1", "gdata:GID").await.unwrap(), None);
    assert!(outbox.try_recv().is_err());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_second_cgam_releases_previous_game() {
    let harness = Harness::start();
    let (client, mut outbox) = harness.connect(1).await;

    harness.send(&client, cgam()).await;
    assert_eq!(next_packet(&mut outbox).await.answer.get("GID"), Some("1"));
    harness.send(&client, cgam()).await;
    assert_eq!(next_packet(&mut outbox).await.answer.get("GID"), Some("2"));

    assert!(!harness.registry.contains(GameId(1)).await);
    assert!(harness.registry.contains(GameId(2)).await);
    assert!(!harness.store.contains("gdata:1"));
    assert!(harness.db.called("delete_game:1:abc123"));
    assert_eq!(
        harness.store.get("session:1", "gdata:GID").await.unwrap(),
        Some("2".to_string())
    );

    harness.close(&client).await;
    let (_store, db, registry) = harness.shutdown().await;

    assert!(registry.is_empty().await);
    assert!(db.called("delete_game:2:abc123"));
}

// =========================================================================
// Join flow
// =========================================================================

#[tokio::test]
async fn test_join_flow_delivers_ticket_to_player() {
    let harness = Harness::start();
    let (server, mut server_outbox) = harness.connect(1).await;
    let (player, mut player_outbox) = harness.connect(2).await;

    harness.send(&server, cgam()).await;
    assert_eq!(next_packet(&mut server_outbox).await.query, "CGAM");

    harness.store.set("session:2", "uID", "42").await.unwrap();
    harness
        .send(
            &player,
            Command::new("USER").with("TID", "5").with("NAME", "sarge"),
        )
        .await;
    assert_eq!(next_packet(&mut player_outbox).await.query, "USER");

    harness
        .send(
            &player,
            Command::new("EGAM")
                .with("TID", "6")
                .with("GID", "1")
                .with("PID", "300"),
        )
        .await;

    let egam = next_packet(&mut player_outbox).await;
    assert_eq!(egam.query, "EGAM");
    assert_eq!(egam.answer.get("GID"), Some("1"));

    let egrq = next_packet(&mut server_outbox).await;
    assert_eq!(egrq.query, "EGRQ");
    assert_eq!(egrq.answer.get("NAME"), Some("sarge"));
    assert_eq!(egrq.answer.get("UID"), Some("42"));
    assert_eq!(egrq.answer.get("PID"), Some("300"));
    let ticket = egrq.answer.get("TICKET").unwrap().to_string();
    assert_eq!(harness.registry.get(GameId(1)).await.unwrap().joining_players, 1);

    harness
        .send(
            &server,
            Command::new("EGRS")
                .with("TID", "7")
                .with("PID", "300")
                .with("ALLOWED", "1"),
        )
        .await;

    let egeg = next_packet(&mut player_outbox).await;
    assert_eq!(egeg.query, "EGEG");
    assert_eq!(egeg.answer.get("TICKET"), Some(ticket.as_str()));
    assert_eq!(egeg.answer.get("I"), Some("10.0.0.1"));
    assert_eq!(egeg.answer.get("P"), Some("18567"));
    assert_eq!(egeg.answer.get("GID"), Some("1"));

    let egrs = next_packet(&mut server_outbox).await;
    assert_eq!(egrs.query, "EGRS");
    assert!(!harness.store.contains("join:300"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_egam_for_unlisted_game_sends_nothing() {
    let harness = Harness::start();
    let (player, mut outbox) = harness.connect(2).await;

    harness
        .send(
            &player,
            Command::new("EGAM").with("TID", "1").with("GID", "55").with("PID", "3"),
        )
        .await;
    harness.send(&player, Command::new("UBRA").with("TID", "2")).await;

    // Only the UBRA answer arrives.
    let packet = next_packet(&mut outbox).await;
    assert_eq!(packet.query, "UBRA");
    assert!(!harness.db.called("joining:55"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_pent_and_plvt_track_team_counts() {
    let db = FakeDatabase::default();
    db.teams.lock().unwrap().insert(300, "2.0000".to_string());
    let harness = Harness::start_with(db);

    let (server, mut outbox) = harness.connect(1).await;
    register_game(&harness.registry, 7, &server).await;
    harness
        .registry
        .update(GameId(7), |g| g.player_joining())
        .await
        .unwrap();

    harness
        .send(
            &server,
            Command::new("PENT").with("TID", "1").with("GID", "7").with("PID", "300"),
        )
        .await;
    let pent = next_packet(&mut outbox).await;
    assert_eq!(pent.query, "PENT");
    assert_eq!(pent.answer.get("PID"), Some("300"));

    let game = harness.registry.get(GameId(7)).await.unwrap();
    assert_eq!((game.joining_players, game.active_players, game.team_2), (0, 1, 1));
    assert!(harness.db.called("entered:7:2"));

    harness
        .send(
            &server,
            Command::new("PLVT").with("TID", "2").with("GID", "7").with("PID", "300"),
        )
        .await;
    assert_eq!(next_packet(&mut outbox).await.query, "PLVT");

    let game = harness.registry.get(GameId(7)).await.unwrap();
    assert_eq!((game.active_players, game.team_2), (0, 0));
    assert!(harness.db.called("left:7:2"));

    harness.shutdown().await;
}
