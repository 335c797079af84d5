use delve::core::broker::{AUDIT_LOG_NAME, read_audit_log};
use delve::core::config::VaultConfig;
use delve::core::envelope::{Code, Envelope, Status};
use delve::core::model::LeafFields;
use delve::core::store::Store;
use delve::core::value::MetaValue;
use delve::vault::{self, ImportStrategy, OpCtx};
use serde_json::{Map, Value, json};
use tempfile::{TempDir, tempdir};

const OWNER: &str = "gm";

fn test_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

fn ctx(store: &Store) -> OpCtx<'_> {
    OpCtx::new(store, Some(OWNER), "")
}

fn ok(env: Envelope) -> Envelope {
    assert_eq!(env.status, Status::Ok, "unexpected failure: {}", env.to_json());
    env
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn leaf_fields(summary: &str, tags: &[&str]) -> LeafFields {
    LeafFields {
        summary: Some(summary.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// `/Crown Vault/Treasury/traps/Poison Needle` plus a sibling container.
fn seed_crown_vault(store: &Store) {
    let c = ctx(store);
    ok(vault::create(&c, "/", "Crown Vault", &LeafFields::summary("Royal hoard"), false));
    ok(vault::create(&c, "/Crown Vault", "Treasury", &LeafFields::default(), false));
    ok(vault::create(&c, "/Crown Vault", "Armory", &LeafFields::default(), false));
    ok(vault::create(
        &c,
        "/Crown Vault/Treasury/traps",
        "Poison Needle",
        &leaf_fields("Hidden in the lock", &["poison", "dc15"]),
        false,
    ));
}

#[test]
fn test_owner_is_required() {
    let (_tmp, store) = test_store();
    for owner in [None, Some("   ")] {
        let c = OpCtx::new(&store, owner, "");
        let env = vault::create(&c, "/", "Keep", &LeafFields::default(), false);
        assert_eq!(env.code, Code::ErrorValidation);
        assert_eq!(env.message, "Owner is required.");
    }
    let env = vault::list(&ctx(&store), "/");
    assert_eq!(env.result["collections"], json!([]));
}

#[test]
fn test_created_envelope_shape() {
    let (_tmp, store) = test_store();
    let env = ok(vault::create(&ctx(&store), "/", "Keep", &LeafFields::default(), false));
    let v = env.to_json();
    assert_eq!(v["version"], "1.0");
    assert_eq!(v["code"], "CREATED");
    assert_eq!(v["command"]["name"], "collection.create");
    assert_eq!(v["target"], json!({"type": "collection", "path": "/Keep", "name": "Keep"}));
    assert_eq!(v["diff"]["applied"], true);
    assert_eq!(v["diff"]["changes"][0]["op"], "add");
    assert!(v["meta"]["ts"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn test_collection_names_unique_per_owner() {
    let (_tmp, store) = test_store();
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));

    let dup = vault::create(&c, "/", "Keep", &LeafFields::default(), false);
    assert_eq!(dup.code, Code::ErrorConflict);

    let again = ok(vault::create(&c, "/", "Keep", &LeafFields::default(), true));
    assert_eq!(again.code, Code::Noop);
    assert_eq!(again.diff.as_ref().map(|d| d.applied), Some(false));

    let other = OpCtx::new(&store, Some("other-gm"), "");
    let env = ok(vault::create(&other, "/", "Keep", &LeafFields::default(), false));
    assert_eq!(env.code, Code::Created);
}

#[test]
fn test_name_freed_after_delete() {
    let (_tmp, store) = test_store();
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));
    ok(vault::delete(&c, "/Keep", Some("DELETE:/Keep")));
    let env = ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));
    assert_eq!(env.code, Code::Created);
}

#[test]
fn test_parent_must_exist() {
    let (_tmp, store) = test_store();
    let c = ctx(&store);
    let env = vault::create(&c, "/Nowhere", "Hall", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorNotFound);

    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));
    let env = vault::create(&c, "/Keep/Hall/traps", "Pit", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorNotFound);
}

#[test]
fn test_invalid_category_and_names() {
    let (_tmp, store) = test_store();
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));
    ok(vault::create(&c, "/Keep", "Hall", &LeafFields::default(), false));

    let env = vault::create(&c, "/Keep/Hall/weapons", "Sword", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorValidation);

    let env = vault::create(&c, "/", "  ", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorValidation);

    let env = vault::create(&c, "/Keep", "Hall", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorConflict);

    let env = vault::create(&c, "/Keep/Hall", "extra", &LeafFields::default(), false);
    assert_eq!(env.code, Code::ErrorValidation);
}

#[test]
fn test_exists_ok_merges_leaf_metadata() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let parent = "/Crown Vault/Treasury/traps";

    let mut first = LeafFields::default();
    first.metadata.insert("dc".into(), MetaValue::from(15));
    ok(vault::create(&c, parent, "Dart", &first, false));

    let mut second = leaf_fields("ignored", &[]);
    second.metadata.insert("reset".into(), MetaValue::from(true));
    let env = ok(vault::create(&c, parent, "Dart", &second, true));
    assert_eq!(env.code, Code::Noop);
    assert_eq!(env.message, "Leaf exists; metadata merged.");

    let leaf = &env.result["leaf"];
    assert_eq!(leaf["metadata"], json!({"dc": 15, "reset": true}));
    assert_eq!(leaf["summary"], Value::Null);
}

#[test]
fn test_rename_collection_cascades() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);

    let env = ok(vault::rename(&c, "/Crown Vault", "Sunken Vault"));
    assert_eq!(env.code, Code::Renamed);
    assert_eq!(env.target.path, "/Sunken Vault");
    assert_eq!(env.result["cascaded"], 3);

    ok(vault::read(&c, "/Sunken Vault/Treasury/traps/Poison Needle"));
    let gone = vault::read(&c, "/Crown Vault/Treasury/traps/Poison Needle");
    assert_eq!(gone.code, Code::ErrorNotFound);

    let env = ok(vault::list(&c, "/Sunken Vault"));
    let names: Vec<&str> = env.result["containers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Armory", "Treasury"]);
}

#[test]
fn test_rename_container_and_conflicts() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);

    let clash = vault::rename(&c, "/Crown Vault/Treasury", "Armory");
    assert_eq!(clash.code, Code::ErrorConflict);
    ok(vault::read(&c, "/Crown Vault/Treasury/traps/Poison Needle"));

    let env = ok(vault::rename(&c, "/Crown Vault/Treasury", "Vaults"));
    assert_eq!(env.target.path, "/Crown Vault/Vaults");
    ok(vault::read(&c, "/Crown Vault/Vaults/traps/Poison Needle"));

    let same = ok(vault::rename(&c, "/Crown Vault/Vaults", "Vaults"));
    assert_eq!(same.code, Code::Noop);

    let env = vault::rename(&c, "/Crown Vault/Vaults/traps", "snares");
    assert_eq!(env.code, Code::ErrorValidation);
}

#[test]
fn test_patch_leaf_fields() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let path = "/Crown Vault/Treasury/traps/Poison Needle";

    ok(vault::patch(&c, path, &fields(json!({"metadata": {"dc": 15}}))));
    let env = ok(vault::patch(
        &c,
        path,
        &fields(json!({"tags": ["Trap", "trap", " lock "], "metadata": {"reset": true}, "notes": "Reset daily"})),
    ));
    assert_eq!(env.code, Code::Updated);
    let leaf = &env.result["leaf"];
    assert_eq!(leaf["tags"], json!(["Trap", "trap", "lock"]));
    assert_eq!(leaf["metadata"], json!({"dc": 15, "reset": true}));
    assert_eq!(leaf["notes"], "Reset daily");
    assert_eq!(leaf["summary"], "Hidden in the lock");

    let env = ok(vault::patch(&c, path, &fields(json!({"name": "Venom Needle"}))));
    assert_eq!(env.target.path, "/Crown Vault/Treasury/traps/Venom Needle");

    let unknown = vault::patch(&c, "/Crown Vault/Treasury/traps/Venom Needle", &fields(json!({"color": "red"})));
    assert_eq!(unknown.code, Code::ErrorValidation);

    let empty = vault::patch(&c, "/Crown Vault/Treasury/traps/Venom Needle", &Map::new());
    assert_eq!(empty.code, Code::ErrorValidation);

    let on_collection = vault::patch(&c, "/Crown Vault", &fields(json!({"tags": ["x"]})));
    assert_eq!(on_collection.code, Code::ErrorValidation);

    let summary = ok(vault::patch(&c, "/Crown Vault", &fields(json!({"summary": "Plundered"}))));
    assert_eq!(summary.result["collection"]["summary"], "Plundered");
}

#[test]
fn test_delete_requires_exact_token() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);

    for token in [None, Some("DELETE:/crown vault"), Some("yes")] {
        let env = vault::delete(&c, "/Crown Vault", token);
        assert_eq!(env.code, Code::ErrorUnsafe);
        assert_eq!(env.result["confirm_required"], true);
        assert_eq!(env.result["token_hint"], "DELETE:/Crown Vault");
    }
    ok(vault::read(&c, "/Crown Vault/Treasury/traps/Poison Needle"));

    let missing = vault::delete(&c, "/Nowhere", None);
    assert_eq!(missing.code, Code::ErrorNotFound);
}

#[test]
fn test_delete_leaf_and_container() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let leaf = "/Crown Vault/Treasury/traps/Poison Needle";

    let token = format!("DELETE:{}", leaf);
    let env = ok(vault::delete(&c, leaf, Some(token.as_str())));
    assert_eq!(env.code, Code::DeletedHard);
    assert_eq!(vault::read(&c, leaf).code, Code::ErrorNotFound);

    let env = ok(vault::delete(&c, "/Crown Vault/Armory", Some("DELETE:/Crown Vault/Armory")));
    assert_eq!(env.result["hard"], true);
    let env = ok(vault::list(&c, "/Crown Vault"));
    assert_eq!(env.result["containers"].as_array().unwrap().len(), 1);
}

#[test]
fn test_move_conflict_keeps_source() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    ok(vault::create(
        &c,
        "/Crown Vault/Armory/traps",
        "Poison Needle",
        &leaf_fields("Armory copy", &[]),
        false,
    ));

    let src = "/Crown Vault/Treasury/traps/Poison Needle";
    let env = vault::move_node(&c, src, "/Crown Vault/Armory/traps", false);
    assert_eq!(env.code, Code::ErrorConflict);
    let still = ok(vault::read(&c, src));
    assert_eq!(still.result["leaf"]["summary"], "Hidden in the lock");

    let env = ok(vault::move_node(&c, src, "/Crown Vault/Armory/traps", true));
    assert_eq!(env.code, Code::Moved);
    assert_eq!(env.target.path, "/Crown Vault/Armory/traps/Poison Needle");
    assert_eq!(vault::read(&c, src).code, Code::ErrorNotFound);
    let moved = ok(vault::read(&c, "/Crown Vault/Armory/traps/Poison Needle"));
    assert_eq!(moved.result["leaf"]["summary"], "Hidden in the lock");
    assert_eq!(moved.result["leaf"]["tags"], json!(["poison", "dc15"]));
}

#[test]
fn test_move_leaf_across_categories_keeps_created_at() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let src = "/Crown Vault/Treasury/traps/Poison Needle";
    let before = ok(vault::read(&c, src)).result["leaf"]["created_at"].clone();

    ok(vault::move_node(&c, src, "/Crown Vault/Treasury/treasures", false));
    let after = ok(vault::read(&c, "/Crown Vault/Treasury/treasures/Poison Needle"));
    assert_eq!(after.result["leaf"]["created_at"], before);
    assert_eq!(after.result["leaf"]["category"], "treasures");
}

#[test]
fn test_copy_leaf_and_container() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let src = "/Crown Vault/Treasury/traps/Poison Needle";

    let same = vault::copy_node(&c, src, "/Crown Vault/Treasury/traps", None, false);
    assert_eq!(same.code, Code::ErrorConflict);

    let env = ok(vault::copy_node(&c, src, "/Crown Vault/Treasury/traps", Some("Needle Two"), false));
    assert_eq!(env.code, Code::Copied);
    ok(vault::read(&c, src));
    ok(vault::read(&c, "/Crown Vault/Treasury/traps/Needle Two"));

    ok(vault::create(&c, "/", "Annex", &LeafFields::default(), false));
    let env = ok(vault::copy_node(&c, "/Crown Vault/Treasury", "/Annex", None, false));
    assert_eq!(env.result["leaves"], 2);
    let listing = ok(vault::list(&c, "/Annex/Treasury/traps"));
    assert_eq!(listing.result["leaves"].as_array().unwrap().len(), 2);
    ok(vault::read(&c, "/Crown Vault/Treasury/traps/Needle Two"));

    let wrong = vault::copy_node(&c, src, "/Annex", None, false);
    assert_eq!(wrong.code, Code::ErrorValidation);
}

#[test]
fn test_move_container_between_collections() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Annex", &LeafFields::default(), false));

    let env = ok(vault::move_node(&c, "/Crown Vault/Treasury", "/Annex", false));
    assert_eq!(env.code, Code::Moved);
    assert_eq!(env.result["from"], "/Crown Vault/Treasury");
    assert_eq!(env.result["to"], "/Annex/Treasury");
    ok(vault::read(&c, "/Annex/Treasury/traps/Poison Needle"));
    assert_eq!(vault::read(&c, "/Crown Vault/Treasury").code, Code::ErrorNotFound);
}

#[test]
fn test_search_semantics() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    ok(vault::create(
        &c,
        "/Crown Vault/Armory/enemies",
        "Ghoul",
        &leaf_fields("Its claws carry POISON", &["undead"]),
        false,
    ));
    ok(vault::create(&c, "/Crown Vault/Armory/enemies", "Rat", &leaf_fields("Harmless", &["beast"]), false));
    ok(vault::create(&c, "/", "Other", &LeafFields::default(), false));
    ok(vault::create(&c, "/Other", "Den", &LeafFields::default(), false));
    ok(vault::create(&c, "/Other/Den/traps", "Poison Dart", &LeafFields::default(), false));

    let env = ok(vault::search(&c, "poison", None, &[]));
    let paths: Vec<&str> = env.result["matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/Crown Vault/Armory/enemies/Ghoul",
            "/Crown Vault/Treasury/traps/Poison Needle",
            "/Other/Den/traps/Poison Dart",
        ]
    );

    let env = ok(vault::search(&c, "poison", None, &["undead".to_string()]));
    assert_eq!(env.result["matches"].as_array().unwrap().len(), 1);
    assert_eq!(env.result["matches"][0]["name"], "Ghoul");

    let env = ok(vault::search(&c, "POISON", Some("Other"), &[]));
    assert_eq!(env.result["matches"].as_array().unwrap().len(), 1);

    let env = ok(vault::search(&c, "poison", None, &[]));
    assert_eq!(env.message, "Found 3 matches for 'poison'.");
}

#[test]
fn test_export_import_rename_round_trip() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let mut meta = Map::new();
    meta.insert("dc".into(), json!(15));
    ok(vault::patch(
        &c,
        "/Crown Vault/Treasury/traps/Poison Needle",
        &fields(json!({"metadata": meta, "notes": "Check the lock"})),
    ));

    let exported = ok(vault::export(&c, "/Crown Vault"));
    let tree = exported.result["collection"].clone();
    assert_eq!(tree["name"], "Crown Vault");
    assert_eq!(
        tree["containers"]["Treasury"]["categories"]
            .as_object()
            .unwrap()
            .keys()
            .collect::<Vec<_>>(),
        vec!["enemies", "puzzles", "traps", "treasures"]
    );

    let env = ok(vault::import(&c, &tree, ImportStrategy::Rename));
    assert_eq!(env.code, Code::Created);
    assert_eq!(env.result["collection"]["name"], "Crown Vault-2");
    assert_eq!(env.result["renamed_from"], "Crown Vault");
    assert_eq!(env.target.path, "/Crown Vault-2");

    let copy = ok(vault::export(&c, "/Crown Vault-2")).result["collection"].clone();
    assert_eq!(copy["summary"], tree["summary"]);
    assert_eq!(copy["created_at"], tree["created_at"]);
    let original_leaf = &tree["containers"]["Treasury"]["categories"]["traps"]["Poison Needle"];
    let copied_leaf = &copy["containers"]["Treasury"]["categories"]["traps"]["Poison Needle"];
    for key in ["name", "summary", "notes", "tags", "metadata", "created_at"] {
        assert_eq!(copied_leaf[key], original_leaf[key], "field {key}");
    }
    assert_eq!(
        copy["containers"].as_object().unwrap().keys().collect::<Vec<_>>(),
        tree["containers"].as_object().unwrap().keys().collect::<Vec<_>>()
    );

    let third = ok(vault::import(&c, &tree, ImportStrategy::Rename));
    assert_eq!(third.result["collection"]["name"], "Crown Vault-3");
}

#[test]
fn test_import_skip_and_overwrite() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let tree = ok(vault::export(&c, "/Crown Vault")).result["collection"].clone();

    ok(vault::create(&c, "/Crown Vault/Treasury/puzzles", "Riddle", &LeafFields::default(), false));

    let skipped = ok(vault::import(&c, &tree, ImportStrategy::Skip));
    assert_eq!(skipped.code, Code::Noop);
    ok(vault::read(&c, "/Crown Vault/Treasury/puzzles/Riddle"));

    let env = ok(vault::import(&c, &tree, ImportStrategy::Overwrite));
    assert_eq!(env.code, Code::Created);
    assert_eq!(vault::read(&c, "/Crown Vault/Treasury/puzzles/Riddle").code, Code::ErrorNotFound);
    ok(vault::read(&c, "/Crown Vault/Treasury/traps/Poison Needle"));

    let bad = vault::import(&c, &json!({"containers": 5}), ImportStrategy::Skip);
    assert_eq!(bad.code, Code::ErrorValidation);
}

#[test]
fn test_stat_and_ensure_category() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);

    let env = ok(vault::stat(&c, "/Crown Vault"));
    assert_eq!(env.result["node"]["type"], "collection");
    assert_eq!(env.result["node"]["children"], 2);

    let env = ok(vault::stat(&c, "/Crown Vault/Treasury/traps"));
    assert_eq!(env.result["node"]["children"], 1);

    let env = ok(vault::ensure_category(&c, "/Crown Vault/Treasury/puzzles"));
    assert_eq!(env.code, Code::Ensured);

    let env = vault::ensure_category(&c, "/Crown Vault/Vaults/puzzles");
    assert_eq!(env.code, Code::ErrorNotFound);

    let env = ok(vault::list(&c, "/Crown Vault/Treasury"));
    assert_eq!(env.result["categories"].as_array().unwrap().len(), 4);
}

#[test]
fn test_crown_vault_search_scenario() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let env = ok(vault::search(&ctx(&store), "poison", None, &[]));
    let matches = env.result["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["path"], "/Crown Vault/Treasury/traps/Poison Needle");
}

#[test]
fn test_crown_vault_delete_scenario() {
    let (_tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);

    let env = ok(vault::delete(&c, "/Crown Vault", Some("DELETE:/Crown Vault")));
    assert_eq!(env.code, Code::DeletedHard);
    assert_eq!(env.result["removed"], 4);

    let env = vault::list(&c, "/Crown Vault");
    assert_eq!(env.code, Code::ErrorNotFound);
    let env = ok(vault::search(&c, "poison", None, &[]));
    assert_eq!(env.result["matches"], json!([]));
}

#[test]
fn test_audit_log_records_each_operation() {
    let (tmp, store) = test_store();
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));
    let _ = vault::create(&c, "/", "Keep", &LeafFields::default(), false);

    let events = read_audit_log(&tmp.path().join(AUDIT_LOG_NAME)).unwrap();
    let ops: Vec<(&str, &str)> = events
        .iter()
        .filter(|e| e.op == "collection.create")
        .map(|e| (e.actor.as_str(), e.status.as_str()))
        .collect();
    assert_eq!(ops, vec![(OWNER, "success"), (OWNER, "error")]);
}

#[test]
fn test_audit_log_can_be_disabled() {
    let tmp = tempdir().unwrap();
    let config = VaultConfig {
        audit_log: false,
        ..Default::default()
    };
    let store = Store::open_with_config(tmp.path(), config).unwrap();
    ok(vault::create(&ctx(&store), "/", "Keep", &LeafFields::default(), false));
    assert!(!tmp.path().join(AUDIT_LOG_NAME).exists());
}

#[test]
fn test_unwritable_audit_log_does_not_mask_committed_delete() {
    let (tmp, store) = test_store();
    let c = ctx(&store);
    ok(vault::create(&c, "/", "Keep", &LeafFields::default(), false));

    let log = tmp.path().join(AUDIT_LOG_NAME);
    std::fs::remove_file(&log).unwrap();
    std::fs::create_dir(&log).unwrap();

    let env = ok(vault::delete(&c, "/Keep", Some("DELETE:/Keep")));
    assert_eq!(env.code, Code::DeletedHard);
    let warnings = &env.diagnostics.as_ref().unwrap().warnings;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Audit log not written"));

    let env = ok(vault::list(&c, "/"));
    assert_eq!(env.result["collections"], json!([]));
}

#[test]
fn test_corrupt_leaf_json_is_reported_not_erased() {
    let (tmp, store) = test_store();
    seed_crown_vault(&store);
    let c = ctx(&store);
    let leaf = "/Crown Vault/Treasury/traps/Poison Needle";

    let conn = rusqlite::Connection::open(tmp.path().join("vault.db")).unwrap();
    conn.execute("UPDATE leaves SET metadata = 'not json' WHERE name = 'Poison Needle'", [])
        .unwrap();

    let env = vault::read(&c, leaf);
    assert_eq!(env.code, Code::ErrorInternal);
    let env = vault::patch(&c, leaf, &fields(json!({"summary": "Rewritten"})));
    assert_eq!(env.code, Code::ErrorInternal);

    let stored: String = conn
        .query_row("SELECT metadata FROM leaves WHERE name = 'Poison Needle'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(stored, "not json");
}
