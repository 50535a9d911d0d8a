use chrono::Duration;
use exam_core::model::{
    AnswerOutcome, AnswerStatus, Difficulty, ItemId, PendingAnswer, SessionId, SessionResult,
    SessionScore, UserId,
};
use exam_core::time::fixed_now;
use storage::repository::{
    AnswerSpoolRepository, ExposureRepository, ItemPoolRepository, ItemRecord,
    SessionResultRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_record(id: u64, category: &str, difficulty: Difficulty) -> ItemRecord {
    ItemRecord {
        id: ItemId::new(id),
        category: category.to_string(),
        topic: "fractions".to_string(),
        difficulty,
        prompt: format!("Q{id}"),
        options: vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()],
        figure: None,
        correct_option: 2,
    }
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn items_round_trip_without_leaking_the_key() {
    let repo = connect("memdb_items").await;

    let mut record = build_record(1, "math", Difficulty::Medium);
    record.figure = Some("https://cdn.example.com/fig.png".to_string());
    repo.upsert_item(&record).await.unwrap();
    repo.upsert_item(&build_record(2, "reading", Difficulty::Easy))
        .await
        .unwrap();

    let math = repo.list_items(Some("math")).await.unwrap();
    assert_eq!(math.len(), 1);
    let item = &math[0];
    assert_eq!(item.id(), ItemId::new(1));
    assert_eq!(item.topic(), "fractions");
    assert_eq!(item.difficulty(), Difficulty::Medium);
    assert_eq!(item.content().option_count(), 4);
    assert!(item.content().figure().is_some());

    // the key is only reachable through the dedicated lookup
    assert_eq!(repo.correct_option(ItemId::new(1)).await.unwrap(), 2);
    assert!(matches!(
        repo.correct_option(ItemId::new(42)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn item_upsert_overwrites_fields() {
    let repo = connect("memdb_item_upsert").await;

    repo.upsert_item(&build_record(1, "math", Difficulty::Easy))
        .await
        .unwrap();
    let mut updated = build_record(1, "math", Difficulty::Hard);
    updated.correct_option = 0;
    repo.upsert_item(&updated).await.unwrap();

    let items = repo.list_items(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].difficulty(), Difficulty::Hard);
    assert_eq!(repo.correct_option(ItemId::new(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn exposures_upsert_in_place_per_user_item() {
    let repo = connect("memdb_exposures").await;
    let user = UserId::new(7);
    let now = fixed_now();

    repo.upsert_item(&build_record(1, "math", Difficulty::Easy))
        .await
        .unwrap();
    repo.upsert_item(&build_record(2, "math", Difficulty::Easy))
        .await
        .unwrap();

    repo.upsert_exposure(user, ItemId::new(1), now, AnswerOutcome::Incorrect)
        .await
        .unwrap();
    repo.upsert_exposure(
        user,
        ItemId::new(1),
        now + Duration::hours(3),
        AnswerOutcome::Correct,
    )
    .await
    .unwrap();
    repo.upsert_exposure(user, ItemId::new(2), now + Duration::hours(1), AnswerOutcome::Correct)
        .await
        .unwrap();

    let records = repo
        .exposures_for(user, &[ItemId::new(1), ItemId::new(2), ItemId::new(3)])
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let first = records
        .iter()
        .find(|r| r.item_id() == ItemId::new(1))
        .unwrap();
    assert_eq!(first.last_seen_at(), now + Duration::hours(3));
    assert_eq!(first.last_outcome(), AnswerOutcome::Correct);

    // requesting a subset filters the cache
    let only_two = repo.exposures_for(user, &[ItemId::new(2)]).await.unwrap();
    assert_eq!(only_two.len(), 1);
    assert_eq!(only_two[0].item_id(), ItemId::new(2));
}

#[tokio::test]
async fn spool_tracks_status_transitions_and_clears() {
    let repo = connect("memdb_spool").await;
    let session = SessionId::generate();
    let now = fixed_now();

    let mut answer = PendingAnswer::new(ItemId::new(5), 1, now);
    repo.upsert_answer(session, &answer).await.unwrap();

    answer.begin_attempt(now).unwrap();
    answer.mark_failed(now + Duration::seconds(2)).unwrap();
    repo.upsert_answer(session, &answer).await.unwrap();

    let loaded = repo.answers_for_session(session).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].status(), AnswerStatus::Failed);
    assert_eq!(loaded[0].attempts(), 1);
    assert_eq!(loaded[0].chosen_option(), 1);

    repo.clear_session(session).await.unwrap();
    assert!(repo.answers_for_session(session).await.unwrap().is_empty());
}

#[tokio::test]
async fn results_enforce_one_row_per_session() {
    let repo = connect("memdb_results").await;
    let now = fixed_now();
    let user = UserId::new(3);

    let score = SessionScore::from_tallies(56, 60).unwrap();
    let session = SessionId::generate();
    let result = SessionResult::new(session, user, score, now - Duration::minutes(20), now)
        .unwrap();

    let id = repo.append_result(&result).await.unwrap();
    let fetched = repo.get_result(id).await.unwrap();
    assert_eq!(fetched.score().score(), 93);
    assert_eq!(fetched.score().correct(), 56);
    assert_eq!(fetched.session_id(), session);

    assert!(matches!(
        repo.append_result(&result).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn results_list_newest_first_with_limit() {
    let repo = connect("memdb_results_list").await;
    let now = fixed_now();
    let user = UserId::new(4);
    let score = SessionScore::from_tallies(1, 2).unwrap();

    for days_ago in [3_i64, 1, 2] {
        let completed = now - Duration::days(days_ago);
        let result = SessionResult::new(
            SessionId::generate(),
            user,
            score,
            completed - Duration::minutes(10),
            completed,
        )
        .unwrap();
        repo.append_result(&result).await.unwrap();
    }

    let listed = repo.results_for_user(user, 2).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].completed_at(), now - Duration::days(1));
    assert_eq!(listed[1].completed_at(), now - Duration::days(2));

    let other = repo.results_for_user(UserId::new(99), 10).await.unwrap();
    assert!(other.is_empty());
}
