use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use spacebook::analytics::NoopSink;
use spacebook::booking::Bookings;
use spacebook::model::ResourceInfo;
use spacebook::resources::InMemoryResources;
use spacebook::store::InMemoryBookingStore;
use spacebook::wire;

const DAY: i64 = 1_717_372_800_000; // 2024-06-03T00:00:00Z
const HOUR: i64 = 3_600_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<InMemoryResources>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let resources = Arc::new(InMemoryResources::new());
    for id in 1..=2 {
        resources.add_workplace(
            ResourceInfo {
                id,
                is_available: true,
                zone: Some("A".into()),
                ..Default::default()
            },
            Some(&format!("desk-{id}")),
        );
    }
    resources.add_parking_space(ResourceInfo {
        id: 1,
        is_available: true,
        ..Default::default()
    });

    let bookings = Arc::new(Bookings::new(
        Arc::new(InMemoryBookingStore::new()),
        resources.clone(),
        Arc::new(NoopSink),
    ));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let bookings = bookings.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(
                    socket,
                    bookings,
                    "spacebook".to_string(),
                    "spacebook".to_string(),
                    None,
                )
                .await;
            });
        }
    });

    (addr, resources)
}

async fn connect_as(addr: SocketAddr, user: &str, password: &str) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("spacebook")
        .user(user)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr) -> Client {
    connect_as(addr, "spacebook", "spacebook").await.unwrap()
}

fn rows(messages: Vec<SimpleQueryMessage>) -> Vec<SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn affected(messages: &[SimpleQueryMessage]) -> Option<u64> {
    messages.iter().find_map(|m| match m {
        SimpleQueryMessage::CommandComplete(n) => Some(*n),
        _ => None,
    })
}

fn int(row: &SimpleQueryRow, column: &str) -> i64 {
    row.get(column).unwrap().parse().unwrap()
}

fn sqlstate(err: &tokio_postgres::Error) -> String {
    err.as_db_error().unwrap().code().code().to_string()
}

async fn create(client: &Client, kind: &str, resource_id: i64, start: i64, end: i64) -> i64 {
    let messages = client
        .simple_query(&format!(
            "INSERT INTO {kind}_bookings (user_id, resource_id, start_time, end_time) \
             VALUES ('alice', {resource_id}, {start}, {end})"
        ))
        .await
        .unwrap();
    let created = rows(messages);
    assert_eq!(created.len(), 1);
    int(&created[0], "id")
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_by_id() {
    let (addr, resources) = start_test_server().await;
    let client = connect(addr).await;

    let id = create(&client, "workplace", 1, DAY + 9 * HOUR, DAY + 10 * HOUR).await;
    assert_eq!(resources.workplace_available(1), Some(false));

    let found = rows(
        client
            .simple_query(&format!("SELECT * FROM workplace_bookings WHERE id = {id}"))
            .await
            .unwrap(),
    );
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("user_id"), Some("alice"));
    assert_eq!(found[0].get("status"), Some("pending"));
    assert_eq!(int(&found[0], "start_time"), DAY + 9 * HOUR);
    assert_eq!(int(&found[0], "total_pages"), 1);
}

#[tokio::test]
async fn unavailable_resource_is_rejected() {
    let (addr, _resources) = start_test_server().await;
    let client = connect(addr).await;

    create(&client, "workplace", 1, DAY + 9 * HOUR, DAY + 10 * HOUR).await;
    let err = client
        .simple_query(&format!(
            "INSERT INTO workplace_bookings (user_id, resource_id, start_time, end_time) \
             VALUES ('bob', 1, {}, {})",
            DAY + 11 * HOUR,
            DAY + 12 * HOUR
        ))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), "23P01");
}

#[tokio::test]
async fn error_kinds_map_to_sqlstates() {
    let (addr, _resources) = start_test_server().await;
    let client = connect(addr).await;

    let bad_interval = client
        .simple_query("INSERT INTO workplace_bookings (user_id, resource_id, start_time, end_time) VALUES ('a', 2, 2000000000000, 1000000000000)")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&bad_interval), "22023");

    let unknown_type = client
        .simple_query("SELECT * FROM boat_bookings")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&unknown_type), "42P01");

    let missing = client
        .simple_query("SELECT * FROM parking_bookings WHERE id = 999")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&missing), "P0002");

    let garbage = client.simple_query("SELEKT nothing").await.unwrap_err();
    assert_eq!(sqlstate(&garbage), "42601");
}

#[tokio::test]
async fn list_paginates_and_filters() {
    let (addr, resources) = start_test_server().await;
    let client = connect(addr).await;

    for i in 0..12 {
        resources.add_parking_space(ResourceInfo {
            id: 100 + i,
            is_available: true,
            ..Default::default()
        });
        create(&client, "parking", 100 + i, DAY + i * HOUR, DAY + i * HOUR + HOUR / 2).await;
    }

    let first = rows(client.simple_query("SELECT * FROM parking_bookings").await.unwrap());
    assert_eq!(first.len(), 10);
    assert_eq!(int(&first[0], "total_count"), 12);
    assert_eq!(int(&first[0], "page"), 1);
    assert_eq!(int(&first[0], "total_pages"), 2);

    let second = rows(
        client
            .simple_query("SELECT * FROM parking_bookings WHERE page = 2")
            .await
            .unwrap(),
    );
    assert_eq!(second.len(), 2);
    assert_eq!(int(&second[0], "page"), 2);

    let filtered = rows(
        client
            .simple_query(&format!(
                "SELECT * FROM parking_bookings WHERE resource_id = 103 AND start_time >= {DAY}"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(filtered.len(), 1);
    assert_eq!(int(&filtered[0], "resource_id"), 103);
}

#[tokio::test]
async fn time_slots_include_free_gaps() {
    let (addr, _resources) = start_test_server().await;
    let client = connect(addr).await;

    create(&client, "workplace", 1, DAY + 9 * HOUR, DAY + 10 * HOUR).await;

    let slots = rows(
        client
            .simple_query(&format!(
                "SELECT * FROM workplace_slots WHERE resource_id = 1 AND date = {DAY}"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(slots.len(), 1);
    assert_eq!(int(&slots[0], "start"), DAY + 9 * HOUR);
    assert_eq!(int(&slots[0], "end"), DAY + 10 * HOUR);
    assert_eq!(slots[0].get("busy"), Some("t"));
}

#[tokio::test]
async fn cancel_releases_resource() {
    let (addr, resources) = start_test_server().await;
    let client = connect(addr).await;

    let id = create(&client, "parking", 1, DAY, DAY + HOUR).await;
    assert_eq!(resources.parking_space_available(1), Some(false));

    let messages = client
        .simple_query(&format!("DELETE FROM parking_bookings WHERE id = {id}"))
        .await
        .unwrap();
    assert_eq!(affected(&messages), Some(1));
    assert_eq!(resources.parking_space_available(1), Some(true));

    let err = client
        .simple_query(&format!("DELETE FROM parking_bookings WHERE id = {id}"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), "P0002");
}

#[tokio::test]
async fn update_and_approve() {
    let (addr, _resources) = start_test_server().await;
    let client = connect(addr).await;

    let id = create(&client, "workplace", 2, DAY + 9 * HOUR, DAY + 10 * HOUR).await;

    let updated = rows(
        client
            .simple_query(&format!(
                "UPDATE workplace_bookings SET end_time = {} WHERE id = {id}",
                DAY + 11 * HOUR
            ))
            .await
            .unwrap(),
    );
    assert_eq!(int(&updated[0], "end_time"), DAY + 11 * HOUR);
    assert_eq!(updated[0].get("status"), Some("pending"));

    let messages = client
        .simple_query("INSERT INTO approvals (unique_tag) VALUES ('desk-2')")
        .await
        .unwrap();
    assert_eq!(affected(&messages), Some(1));

    let found = rows(
        client
            .simple_query(&format!("SELECT * FROM workplace_bookings WHERE id = {id}"))
            .await
            .unwrap(),
    );
    assert_eq!(found[0].get("status"), Some("working"));
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let (addr, _resources) = start_test_server().await;
    let client = connect(addr).await;

    let id = create(&client, "workplace", 1, DAY + 9 * HOUR, DAY + 10 * HOUR).await;

    let found = client
        .query(
            "SELECT * FROM workplace_bookings WHERE id = $1",
            &[&id.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let user: &str = found[0].get("user_id");
    assert_eq!(user, "alice");
}

#[tokio::test]
async fn wrong_user_is_refused() {
    let (addr, _resources) = start_test_server().await;
    assert!(connect_as(addr, "mallory", "spacebook").await.is_err());
    assert!(connect_as(addr, "spacebook", "wrong").await.is_err());
}
