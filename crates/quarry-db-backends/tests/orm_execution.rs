//! Integration tests for the ORM execution pipeline.
//!
//! These tests verify the complete round-trip from model registration
//! through schema creation, SQL compilation, execution on a real SQLite
//! database, and result mapping back to model instances.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use quarry_core::QuarryError;
use quarry_db::fields::FieldType;
use quarry_db::filter::{Filter, Op};
use quarry_db::model::{Model, ModelSpec};
use quarry_db::orm::Orm;
use quarry_db::queryset::Aggregate;
use quarry_db::value::Value;
use quarry_db_backends::DatabaseConfig;

// ── Test model definitions ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Team {
    id: i64,
    name: String,
}

impl Model for Team {
    fn spec() -> ModelSpec {
        ModelSpec::new("Team").property("name", FieldType::Text, "max_length=45")
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::Int(self.id)),
            "name" => Some(Value::String(self.name.clone())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        match field {
            "id" => self.id = value.as_int().unwrap_or(0),
            "name" => self.name = value.as_str().unwrap_or("").to_string(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
struct Player {
    id: i64,
    name: String,
    score: f64,
    active: bool,
    tags: Vec<String>,
    avatar: Vec<u8>,
    team_id: Option<i64>,
    team: Option<Box<Team>>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            score: 0.0,
            active: false,
            tags: Vec::new(),
            avatar: Vec::new(),
            team_id: None,
            // An embedded instance so select-related rows have somewhere
            // to land.
            team: Some(Box::default()),
        }
    }
}

impl Player {
    fn new(name: &str, score: f64) -> Self {
        Self {
            name: name.to_string(),
            score,
            active: true,
            ..Self::default()
        }
    }
}

impl Model for Player {
    fn spec() -> ModelSpec {
        ModelSpec::new("Player")
            .property("name", FieldType::Text, "max_length=45")
            .property("score", FieldType::Double, "")
            .property("active", FieldType::Bool, "")
            .property("tags", FieldType::TextList, "max_length=255")
            .property("avatar", FieldType::Bytes, "null=true")
            .foreign("team", "Team", "null=true on_delete=set_null")
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::Int(self.id)),
            "name" => Some(Value::String(self.name.clone())),
            "score" => Some(Value::Float(self.score)),
            "active" => Some(Value::Bool(self.active)),
            "tags" => Some(Value::from(self.tags.clone())),
            "avatar" => Some(Value::Bytes(self.avatar.clone())),
            "team_id" => Some(self.team_id.map_or(Value::Null, Value::Int)),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        match field {
            "id" => self.id = value.as_int().unwrap_or(0),
            "name" => self.name = value.as_str().unwrap_or("").to_string(),
            "score" => self.score = value.as_float().unwrap_or(0.0),
            "active" => {
                self.active = value.as_bool().unwrap_or(value.as_int().unwrap_or(0) != 0);
            }
            "tags" => self.tags = value.as_string_list(),
            "avatar" => {
                self.avatar = match value {
                    Value::Bytes(b) => b,
                    _ => Vec::new(),
                };
            }
            "team_id" => self.team_id = value.as_int(),
            _ => {}
        }
    }

    fn related_mut(&mut self, field: &str) -> Option<&mut dyn Model> {
        match field {
            "team" => self
                .team
                .as_deref_mut()
                .map(|team| team as &mut dyn Model),
            _ => None,
        }
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────

fn open_memory_orm() -> Orm {
    let orm = Orm::open(Box::new(DatabaseConfig::sqlite_memory())).unwrap();
    orm.register::<Team>();
    orm.register::<Player>();
    orm.create_tables().unwrap();
    orm
}

fn insert_scores(orm: &Orm) -> Vec<i64> {
    [("ada", 1.0), ("grace", 2.0), ("edsger", 3.0)]
        .iter()
        .map(|(name, score)| {
            let mut player = Player::new(name, *score);
            orm.save(&mut player).unwrap();
            player.id
        })
        .collect()
}

// ── Schema lifecycle ──────────────────────────────────────────────────

#[test]
fn test_create_and_drop_tables() {
    let orm = open_memory_orm();
    let tables = orm.table_names().unwrap();
    assert!(tables.contains(&"team".to_string()));
    assert!(tables.contains(&"player".to_string()));

    orm.drop_tables().unwrap();
    let tables = orm.table_names().unwrap();
    assert!(!tables.contains(&"player".to_string()));

    // Dropping absent tables is a no-op success.
    orm.drop_tables().unwrap();
}

// ── Save / load round-trips ───────────────────────────────────────────

#[test]
fn test_save_assigns_generated_primary_key() {
    let orm = open_memory_orm();
    let mut player = Player::new("ada", 1.5);
    orm.save(&mut player).unwrap();
    assert!(player.id > 0);

    let mut second = Player::new("grace", 2.5);
    orm.save(&mut second).unwrap();
    assert!(second.id > player.id);
}

#[test]
fn test_round_trip_preserves_field_values() {
    let orm = open_memory_orm();
    let mut player = Player::new("ada", 1.5);
    player.tags = vec!["math".to_string(), "pioneer".to_string()];
    player.avatar = vec![0xde, 0xad, 0xbe, 0xef];
    orm.save(&mut player).unwrap();

    let loaded = orm
        .objects::<Player>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(player.id)))
        .unwrap();
    assert_eq!(loaded.id, player.id);
    assert_eq!(loaded.name, "ada");
    assert_eq!(loaded.score, 1.5);
    assert!(loaded.active);
    assert_eq!(loaded.tags, vec!["math".to_string(), "pioneer".to_string()]);
    assert_eq!(loaded.avatar, vec![0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn test_empty_tag_list_round_trips() {
    let orm = open_memory_orm();
    let mut player = Player::new("ada", 1.0);
    orm.save(&mut player).unwrap();
    let loaded = orm
        .objects::<Player>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(player.id)))
        .unwrap();
    assert!(loaded.tags.is_empty());
}

#[test]
fn test_save_existing_row_updates() {
    let orm = open_memory_orm();
    let mut player = Player::new("ada", 1.0);
    orm.save(&mut player).unwrap();

    player.score = 9.0;
    player.name = "ada l".to_string();
    orm.save(&mut player).unwrap();

    assert_eq!(orm.objects::<Player>().unwrap().count().unwrap(), 1);
    let loaded = orm
        .objects::<Player>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(player.id)))
        .unwrap();
    assert_eq!(loaded.name, "ada l");
    assert_eq!(loaded.score, 9.0);
}

#[test]
fn test_delete_instance() {
    let orm = open_memory_orm();
    let mut player = Player::new("ada", 1.0);
    orm.save(&mut player).unwrap();
    orm.delete(&player).unwrap();
    assert_eq!(orm.objects::<Player>().unwrap().count().unwrap(), 0);
}

// ── Filtering and ordering ────────────────────────────────────────────

#[test]
fn test_filter_with_ordering_scenario() {
    let orm = open_memory_orm();
    let ids = insert_scores(&orm);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("score", Op::GreaterOrEquals, Value::Float(2.0)))
        .order_by(&["id"]);
    assert_eq!(qs.size().unwrap(), 2);
    let first = qs.at(0).unwrap();
    let second = qs.at(1).unwrap();
    assert_eq!(first.id, ids[1]);
    assert_eq!(second.id, ids[2]);
}

#[test]
fn test_or_filter_union_semantics() {
    let orm = open_memory_orm();
    insert_scores(&orm);

    let either = Filter::new("score", Op::GreaterOrEquals, Value::Float(2.0))
        | Filter::new("score", Op::LessOrEquals, Value::Float(1.0));
    let mut qs = orm.objects::<Player>().unwrap().filter(either);
    assert_eq!(qs.size().unwrap(), 3);
}

#[test]
fn test_exclude_negates_predicate() {
    let orm = open_memory_orm();
    insert_scores(&orm);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .exclude(Filter::new("score", Op::GreaterOrEquals, Value::Float(2.0)));
    assert_eq!(qs.size().unwrap(), 1);
    assert_eq!(qs.at(0).unwrap().name, "ada");
}

#[test]
fn test_string_match_operators() {
    let orm = open_memory_orm();
    insert_scores(&orm);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("name", Op::StartsWith, "gr"));
    assert_eq!(qs.size().unwrap(), 1);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("name", Op::Contains, "ds"));
    assert_eq!(qs.size().unwrap(), 1);
    assert_eq!(qs.at(0).unwrap().name, "edsger");

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(!Filter::new("name", Op::EndsWith, "a"));
    assert_eq!(qs.size().unwrap(), 2);
}

#[test]
fn test_like_wildcards_are_escaped() {
    let orm = open_memory_orm();
    let mut odd = Player::new("100%_done", 1.0);
    orm.save(&mut odd).unwrap();
    let mut plain = Player::new("100x done", 1.0);
    orm.save(&mut plain).unwrap();

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("name", Op::Contains, "0%_"));
    assert_eq!(qs.size().unwrap(), 1);
    assert_eq!(qs.at(0).unwrap().name, "100%_done");
}

#[test]
fn test_is_in_and_is_null() {
    let orm = open_memory_orm();
    insert_scores(&orm);

    let mut qs = orm.objects::<Player>().unwrap().filter(Filter::new(
        "name",
        Op::IsIn,
        Value::List(vec![
            Value::String("ada".to_string()),
            Value::String("edsger".to_string()),
        ]),
    ));
    assert_eq!(qs.size().unwrap(), 2);

    // All three players were saved without a team.
    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("team_id", Op::IsNull, Value::Bool(true)));
    assert_eq!(qs.size().unwrap(), 3);
}

#[test]
fn test_case_insensitive_match() {
    let orm = open_memory_orm();
    insert_scores(&orm);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("name", Op::IEquals, "ADA"));
    assert_eq!(qs.size().unwrap(), 1);
}

#[test]
fn test_get_cardinality() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let qs = orm.objects::<Player>().unwrap();

    assert!(qs.get(Filter::new("name", Op::Equals, "ada")).is_ok());
    assert!(matches!(
        qs.get(Filter::new("name", Op::Equals, "nobody")),
        Err(QuarryError::NotFound(_))
    ));
    assert!(matches!(
        qs.get(Filter::new("active", Op::Equals, Value::Bool(true))),
        Err(QuarryError::NotFound(_))
    ));
}

#[test]
fn test_iteration() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm.objects::<Player>().unwrap().order_by(&["-score"]);
    let names: Vec<String> = qs
        .iter()
        .unwrap()
        .map(|player| player.unwrap().name)
        .collect();
    assert_eq!(names, ["edsger", "grace", "ada"]);
}

// ── Slicing ───────────────────────────────────────────────────────────

#[test]
fn test_limit_window() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .order_by(&["id"])
        .limit(1, Some(2));
    assert_eq!(qs.size().unwrap(), 2);
    assert_eq!(qs.at(0).unwrap().name, "grace");
    assert_eq!(qs.at(1).unwrap().name, "edsger");
}

#[test]
fn test_offset_without_length() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .order_by(&["id"])
        .limit(2, None);
    assert_eq!(qs.size().unwrap(), 1);
}

// ── Projections and aggregates ────────────────────────────────────────

#[test]
fn test_values_projection() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm.objects::<Player>().unwrap().order_by(&["id"]);
    let values = qs.values(&["name", "score"]).unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0]["name"], Value::String("ada".to_string()));
    assert_eq!(values[2]["score"], Value::Float(3.0));

    let lists = qs.values_list(&["score"]).unwrap();
    assert_eq!(
        lists,
        vec![
            vec![Value::Float(1.0)],
            vec![Value::Float(2.0)],
            vec![Value::Float(3.0)]
        ]
    );
}

#[test]
fn test_aggregates() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let qs = orm.objects::<Player>().unwrap();
    assert_eq!(qs.aggregate(Aggregate::Count, "*").unwrap(), Value::Int(3));
    assert_eq!(qs.aggregate(Aggregate::Sum, "score").unwrap(), Value::Float(6.0));
    assert_eq!(qs.aggregate(Aggregate::Min, "score").unwrap(), Value::Float(1.0));
    assert_eq!(qs.aggregate(Aggregate::Max, "score").unwrap(), Value::Float(3.0));
    assert_eq!(qs.aggregate(Aggregate::Avg, "score").unwrap(), Value::Float(2.0));

    let filtered = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("score", Op::GreaterThan, Value::Float(1.0)));
    assert_eq!(filtered.count().unwrap(), 2);
}

// ── Queryset mutations ────────────────────────────────────────────────

#[test]
fn test_queryset_update() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("score", Op::LessThan, Value::Float(2.5)));
    let affected = qs.update(&[("active", Value::Bool(false))]).unwrap();
    assert_eq!(affected, 2);

    let mut inactive = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("active", Op::Equals, Value::Bool(false)));
    assert_eq!(inactive.size().unwrap(), 2);
}

#[test]
fn test_queryset_remove() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("score", Op::GreaterThan, Value::Float(1.5)));
    let affected = qs.remove().unwrap();
    assert_eq!(affected, 2);
    assert_eq!(orm.objects::<Player>().unwrap().count().unwrap(), 1);
}

#[test]
fn test_mutation_invalidates_cache() {
    let orm = open_memory_orm();
    insert_scores(&orm);
    let mut qs = orm.objects::<Player>().unwrap();
    assert_eq!(qs.size().unwrap(), 3);
    qs.update(&[("score", Value::Float(0.0))]).unwrap();
    // The cache was dropped, so the next size() refetches.
    assert_eq!(qs.size().unwrap(), 3);
    let mut zeroed = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("score", Op::Equals, Value::Float(0.0)));
    assert_eq!(zeroed.size().unwrap(), 3);
}

// ── Relations ─────────────────────────────────────────────────────────

fn team_with_players(orm: &Orm) -> (i64, Vec<i64>) {
    let mut team = Team {
        id: 0,
        name: "reds".to_string(),
    };
    orm.save(&mut team).unwrap();
    let ids = [("ada", 1.0), ("grace", 2.0)]
        .iter()
        .map(|(name, score)| {
            let mut player = Player::new(name, *score);
            player.team_id = Some(team.id);
            orm.save(&mut player).unwrap();
            player.id
        })
        .collect();
    (team.id, ids)
}

#[test]
fn test_filter_through_foreign_key() {
    let orm = open_memory_orm();
    let (_, ids) = team_with_players(&orm);
    let mut loner = Player::new("edsger", 3.0);
    orm.save(&mut loner).unwrap();

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .filter(Filter::new("team__name", Op::Equals, "reds"))
        .order_by(&["id"]);
    assert_eq!(qs.size().unwrap(), 2);
    assert_eq!(qs.at(0).unwrap().id, ids[0]);
}

#[test]
fn test_reverse_relation_filter() {
    let orm = open_memory_orm();
    team_with_players(&orm);
    let mut empty_team = Team {
        id: 0,
        name: "blues".to_string(),
    };
    orm.save(&mut empty_team).unwrap();

    let mut qs = orm
        .objects::<Team>()
        .unwrap()
        .filter(Filter::new(
            "player__score",
            Op::GreaterOrEquals,
            Value::Float(2.0),
        ));
    assert_eq!(qs.size().unwrap(), 1);
    assert_eq!(qs.at(0).unwrap().name, "reds");
}

#[test]
fn test_select_related_loads_target() {
    let orm = open_memory_orm();
    team_with_players(&orm);

    let mut qs = orm
        .objects::<Player>()
        .unwrap()
        .select_related(&["team"])
        .order_by(&["id"]);
    let player = qs.at(0).unwrap();
    let team = player.team.as_ref().unwrap();
    assert_eq!(team.name, "reds");
    assert_eq!(Some(team.id), player.team_id);
}

#[test]
fn test_foreign_key_accessors() {
    let orm = open_memory_orm();
    let (_, ids) = team_with_players(&orm);
    let descriptor = orm.descriptor("Player").unwrap();

    let mut player = orm
        .objects::<Player>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(ids[0])))
        .unwrap();
    // The embedded team is still a blank default; the accessor notices the
    // key mismatch and fetches the referenced row.
    let team = descriptor.foreign_key(&orm, &mut player, "team").unwrap();
    assert_eq!(team.get("name"), Some(Value::String("reds".to_string())));

    let mut blues = Team {
        id: 0,
        name: "blues".to_string(),
    };
    orm.save(&mut blues).unwrap();
    descriptor
        .set_foreign_key(orm.models(), &mut player, "team", Some(&blues))
        .unwrap();
    assert_eq!(player.team_id, Some(blues.id));
    descriptor
        .set_foreign_key(orm.models(), &mut player, "team", None)
        .unwrap();
    assert_eq!(player.team_id, None);
}

#[test]
fn test_on_delete_set_null() {
    let orm = open_memory_orm();
    let (team_id, ids) = team_with_players(&orm);

    let team = orm
        .objects::<Team>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(team_id)))
        .unwrap();
    orm.delete(&team).unwrap();

    let loaded = orm
        .objects::<Player>()
        .unwrap()
        .get(Filter::new("pk", Op::Equals, Value::Int(ids[0])))
        .unwrap();
    assert_eq!(loaded.team_id, None);
}

#[test]
fn test_set_null_clause_rendered_for_all_dialects() {
    // Engines without live enforcement still get the clause in the DDL.
    let orm = open_memory_orm();
    let descriptor = orm.descriptor("Player").unwrap();
    for dialect in [
        quarry_db::dialect::Dialect::Sqlite,
        quarry_db::dialect::Dialect::MySql,
        quarry_db::dialect::Dialect::Postgres,
        quarry_db::dialect::Dialect::Mssql,
    ] {
        let sql = descriptor.create_table_sql(orm.models(), dialect).unwrap();
        assert!(
            sql[0].contains("ON DELETE SET NULL"),
            "missing clause for {dialect:?}"
        );
    }
}

// ── Concurrency ───────────────────────────────────────────────────────

static TEMP_DB_SEQ: AtomicU32 = AtomicU32::new(0);

struct TempDb {
    path: std::path::PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let seq = TEMP_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "quarry-orm-test-{}-{seq}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Self { path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        for suffix in ["-wal", "-shm"] {
            let mut side = self.path.as_os_str().to_owned();
            side.push(suffix);
            let _ = std::fs::remove_file(std::path::PathBuf::from(side));
        }
    }
}

#[test]
fn test_concurrent_inserts_from_worker_threads() {
    let db = TempDb::new();
    let orm = Orm::open(Box::new(DatabaseConfig::sqlite_file(
        db.path.to_string_lossy().to_string(),
    )))
    .unwrap();
    orm.register::<Team>();
    orm.register::<Player>();
    orm.create_tables().unwrap();

    let mut handles = Vec::new();
    for worker in 0..2 {
        let orm = orm.clone();
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..100 {
                let mut player = Player::new(&format!("w{worker}-{i}"), f64::from(i));
                orm.save(&mut player).unwrap();
                ids.push(player.id);
            }
            ids
        }));
    }

    let mut all_ids = Vec::new();
    for handle in handles {
        all_ids.extend(handle.join().unwrap());
    }

    assert_eq!(orm.objects::<Player>().unwrap().count().unwrap(), 200);
    let unique: HashSet<i64> = all_ids.iter().copied().collect();
    assert_eq!(unique.len(), 200);
}
