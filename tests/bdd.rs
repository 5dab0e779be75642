use std::{collections::HashMap, fmt, fs::File};

use anyhow::Context;
use cucumber::{gherkin::Step, given, then, when, World as _};
use itinerary::{
    auth,
    config::{ActivityConfig, AppConfig},
    db::{init_pool, run_migrations},
    error::AppError,
    models::{
        activity::ActivityLogEntry,
        event::Event,
        trip::{CollaboratorRole, NewTrip, TripPatch, TripView},
        user::UserSnapshot,
    },
    services::reconcile::Vote,
    state::AppState,
};
use tempfile::TempDir;

const PASSWORD: &str = "correct horse";

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: HashMap<String, UserSnapshot>,
    trip_id: Option<String>,
    outcome: Option<Outcome>,
}

#[derive(Debug)]
enum Outcome {
    Updated(Box<TripView>),
    Rejected(String),
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn user(&self, name: &str) -> &UserSnapshot {
        self.users
            .get(name)
            .unwrap_or_else(|| panic!("user {name} must be registered first"))
    }

    fn trip_id(&self) -> &str {
        self.trip_id.as_deref().expect("a trip must exist first")
    }

    fn record(&mut self, result: Result<TripView, AppError>) {
        self.outcome = Some(match result {
            Ok(trip) => Outcome::Updated(Box::new(trip)),
            Err(err) => Outcome::Rejected(error_kind(&err).to_string()),
        });
    }

    async fn stored_events(&self) -> Vec<Event> {
        self.app_state()
            .storage
            .load_trip(self.trip_id())
            .await
            .expect("load trip")
            .expect("trip exists")
            .events
    }

    async fn stored_event(&self, event_id: &str) -> Event {
        self.stored_events()
            .await
            .into_iter()
            .find(|e| e.id == event_id)
            .unwrap_or_else(|| panic!("event {event_id} is stored"))
    }

    async fn activity(&self) -> Vec<ActivityLogEntry> {
        let state = self.app_state();
        state.activity.flush().await;
        state
            .storage
            .list_activity(self.trip_id())
            .await
            .expect("list activity")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: ([127, 0, 0, 1], 0).into(),
            auth_user_header: "x-user-id".into(),
            admin_emails: Vec::new(),
            activity: ActivityConfig::default(),
        };

        let db = init_pool(&config.database_url).await?;
        run_migrations(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn error_kind(err: &AppError) -> &'static str {
    match err {
        AppError::NotFound => "not found",
        AppError::Forbidden => "access denied",
        AppError::Unauthorized => "unauthorized",
        AppError::BadRequest(_) => "bad request",
        AppError::Conflict(_) => "conflict",
        _ => "internal",
    }
}

fn docstring_events(step: &Step) -> Vec<Event> {
    let raw = step.docstring.as_deref().expect("step needs a docstring");
    serde_json::from_str(raw).expect("docstring holds an event list")
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.trip_id = None;
    world.outcome = None;
}

#[given(regex = r#"^a registered user "([^"]+)" with email "([^"]+)"$"#)]
async fn given_registered_user(world: &mut AppWorld, name: String, email: String) {
    let user = auth::register_user(world.app_state(), &name, &email, PASSWORD)
        .await
        .expect("register user");
    world.users.insert(name, user.snapshot());
}

#[given(regex = r#"^"([^"]+)" owns a trip called "([^"]+)"$"#)]
async fn given_trip(world: &mut AppWorld, owner: String, name: String) {
    let owner = world.user(&owner).clone();
    let trip = world
        .app_state()
        .trips
        .create_trip(
            &owner,
            NewTrip {
                name,
                ..Default::default()
            },
        )
        .await
        .expect("create trip");
    world.trip_id = Some(trip.id);
}

#[given(regex = r#"^"([^"]+)" is a collaborator with role "(editor|viewer)"$"#)]
async fn given_collaborator(world: &mut AppWorld, name: String, role: String) {
    let role = match role.as_str() {
        "editor" => CollaboratorRole::Editor,
        _ => CollaboratorRole::Viewer,
    };
    let trip = world
        .app_state()
        .storage
        .load_trip(world.trip_id())
        .await
        .expect("load trip")
        .expect("trip exists");
    let owner = world
        .users
        .values()
        .find(|u| u.id == trip.owner_id)
        .expect("owner is registered")
        .clone();
    let email = world.user(&name).email.clone();
    world
        .app_state()
        .trips
        .add_collaborator(world.trip_id(), &owner, &email, role)
        .await
        .expect("add collaborator");
}

#[given("the trip already has the events:")]
async fn given_events(world: &mut AppWorld, step: &Step) {
    let events = docstring_events(step);
    let trip = world
        .app_state()
        .storage
        .load_trip(world.trip_id())
        .await
        .expect("load trip")
        .expect("trip exists");
    let owner = world
        .users
        .values()
        .find(|u| u.id == trip.owner_id)
        .expect("owner is registered")
        .clone();
    world
        .app_state()
        .trips
        .update_trip(
            world.trip_id(),
            &owner,
            TripPatch {
                events: Some(events),
                ..Default::default()
            },
        )
        .await
        .expect("seed events");
}

#[when(regex = r#"^"([^"]+)" submits the events:$"#)]
async fn when_submit_events(world: &mut AppWorld, name: String, step: &Step) {
    let actor = world.user(&name).clone();
    let patch = TripPatch {
        events: Some(docstring_events(step)),
        ..Default::default()
    };
    let result = world
        .app_state()
        .trips
        .update_trip(world.trip_id(), &actor, patch)
        .await;
    world.record(result);
}

#[when(regex = r#"^"([^"]+)" resubmits the stored events$"#)]
async fn when_resubmit(world: &mut AppWorld, name: String) {
    let actor = world.user(&name).clone();
    let patch = TripPatch {
        events: Some(world.stored_events().await),
        ..Default::default()
    };
    let result = world
        .app_state()
        .trips
        .update_trip(world.trip_id(), &actor, patch)
        .await;
    world.record(result);
}

#[when(regex = r#"^"([^"]+)" patches the trip with:$"#)]
async fn when_patch(world: &mut AppWorld, name: String, step: &Step) {
    let actor = world.user(&name).clone();
    let raw = step.docstring.as_deref().expect("step needs a docstring");
    let patch: TripPatch = serde_json::from_str(raw).expect("docstring holds a trip patch");
    let result = world
        .app_state()
        .trips
        .update_trip(world.trip_id(), &actor, patch)
        .await;
    world.record(result);
}

#[when(regex = r#"^"([^"]+)" votes "(like|dislike|remove)" on event "([^"]+)"$"#)]
async fn when_vote(world: &mut AppWorld, name: String, vote: String, event_id: String) {
    let actor = world.user(&name).clone();
    let vote = match vote.as_str() {
        "like" => Vote::Like,
        "dislike" => Vote::Dislike,
        _ => Vote::Remove,
    };
    let result = world
        .app_state()
        .trips
        .vote(world.trip_id(), &actor, &event_id, vote)
        .await;
    world.record(result);
}

#[then("the update succeeds")]
async fn then_succeeds(world: &mut AppWorld) {
    match &world.outcome {
        Some(Outcome::Updated(_)) => {}
        other => panic!("expected a successful update, got {other:?}"),
    }
}

#[then(regex = r#"^the update is rejected as "([^"]+)"$"#)]
async fn then_rejected(world: &mut AppWorld, kind: String) {
    match &world.outcome {
        Some(Outcome::Rejected(actual)) => assert_eq!(actual, &kind),
        other => panic!("expected rejection as {kind}, got {other:?}"),
    }
}

#[then(regex = r#"^the trip has the events "([^"]*)"$"#)]
async fn then_event_ids(world: &mut AppWorld, ids: String) {
    let expected: Vec<&str> = ids.split(',').map(str::trim).collect();
    let events = world.stored_events().await;
    let actual: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(actual, expected);
}

#[then("the trip has no events")]
async fn then_no_events(world: &mut AppWorld) {
    assert!(world.stored_events().await.is_empty());
}

#[then(regex = r#"^event "([^"]+)" has notes "([^"]*)"$"#)]
async fn then_notes(world: &mut AppWorld, event_id: String, notes: String) {
    let event = world.stored_event(&event_id).await;
    assert_eq!(event.notes.as_deref(), Some(notes.as_str()));
}

#[then(regex = r#"^event "([^"]+)" was last updated by "([^"]+)"$"#)]
async fn then_updated_by(world: &mut AppWorld, event_id: String, name: String) {
    let event = world.stored_event(&event_id).await;
    assert_eq!(event.updated_by.as_ref(), Some(world.user(&name)));
}

#[then(regex = r#"^event "([^"]+)" was created and last updated by "([^"]+)"$"#)]
async fn then_created_by(world: &mut AppWorld, event_id: String, name: String) {
    let event = world.stored_event(&event_id).await;
    let user = world.user(&name);
    assert_eq!(event.created_by.as_ref(), Some(user));
    assert_eq!(event.updated_by.as_ref(), Some(user));
    assert!(event.created_at.is_some());
    assert_eq!(event.created_at, event.updated_at);
}

#[then(regex = r#"^event "([^"]+)" is liked by "([^"]+)"$"#)]
async fn then_liked(world: &mut AppWorld, event_id: String, name: String) {
    let event = world.stored_event(&event_id).await;
    assert!(event.likes.contains(&world.user(&name).id));
}

#[then(regex = r#"^event "([^"]+)" is not disliked by "([^"]+)"$"#)]
async fn then_not_disliked(world: &mut AppWorld, event_id: String, name: String) {
    let event = world.stored_event(&event_id).await;
    assert!(!event.dislikes.contains(&world.user(&name).id));
}

#[then(regex = r#"^the activity log contains (\d+) "([^"]+)" entr(?:y|ies)$"#)]
async fn then_activity_count(world: &mut AppWorld, expected: usize, action: String) {
    let entries = world.activity().await;
    let count = entries
        .iter()
        .filter(|entry| entry.action.as_str() == action)
        .count();
    assert_eq!(count, expected, "entries: {entries:#?}");
}

#[then(regex = r#"^the activity log ends with "([^"]+)"$"#)]
async fn then_activity_tail(world: &mut AppWorld, actions: String) {
    let expected: Vec<&str> = actions.split(',').map(str::trim).collect();
    let entries = world.activity().await;
    let mut recent: Vec<&str> = entries
        .iter()
        .take(expected.len())
        .map(|entry| entry.action.as_str())
        .collect();
    recent.reverse();
    assert_eq!(recent, expected);
}

#[then(regex = r#"^event "([^"]+)" has no votes$"#)]
async fn then_no_votes(world: &mut AppWorld, event_id: String) {
    let event = world.stored_event(&event_id).await;
    assert!(event.likes.is_empty(), "likes: {:?}", event.likes);
    assert!(event.dislikes.is_empty(), "dislikes: {:?}", event.dislikes);
}

#[then(regex = r#"^the trip is at version (\d+)$"#)]
async fn then_version(world: &mut AppWorld, version: i64) {
    let trip = world
        .app_state()
        .storage
        .load_trip(world.trip_id())
        .await
        .expect("load trip")
        .expect("trip exists");
    assert_eq!(trip.version, version);
}

#[then(regex = r#"^the latest "([^"]+)" entry changed the fields "([^"]*)"$"#)]
async fn then_changed_fields(world: &mut AppWorld, action: String, fields: String) {
    let entries = world.activity().await;
    let entry = entries
        .iter()
        .find(|entry| entry.action.as_str() == action)
        .unwrap_or_else(|| panic!("no {action} entry"));
    let changed: Vec<&str> = entry.details["changedFields"]
        .as_array()
        .expect("changedFields is a list")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(changed.join(", "), fields);
}

#[then(regex = r#"^I can authenticate as "([^"]+)" using password "([^"]+)"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, email: String, password: String) {
    let user = auth::authenticate_user(world.app_state(), &email, &password)
        .await
        .expect("authentication");
    assert_eq!(user.email, email);
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
