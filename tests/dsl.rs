use delve::core::envelope::{Code, Status};
use delve::dsl::{execute_file, execute_line, execute_script};
use delve::{Envelope, Store};
use std::fs;
use tempfile::{TempDir, tempdir};

fn test_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

fn exec(store: &Store, line: &str) -> Envelope {
    execute_line(store, Some("gm"), line).unwrap_or_else(|| panic!("no envelope for {:?}", line))
}

fn ok(store: &Store, line: &str) -> Envelope {
    let env = exec(store, line);
    assert_eq!(env.status, Status::Ok, "{}: {}", line, env.message);
    env
}

const SEED: &str = r#"
# Crown Vault seed
collection create "Crown Vault" "Royal hoard"
container create "Crown Vault" Treasury "Gold and traps"
leaf create "Crown Vault" Treasury traps "Poison Needle" "Hidden in the lock" tags=trap,poison meta=dc=15,reset=true
leaf create "Crown Vault" Treasury treasures "Ruby Crown" summary="A crown, heavy with rubies" tags=loot
"#;

fn seeded() -> (TempDir, Store) {
    let (tmp, store) = test_store();
    let batch = execute_script(&store, Some("gm"), "seed", SEED);
    assert_eq!(batch.summary.error, 0, "{:?}", batch.results);
    (tmp, store)
}

#[test]
fn test_create_then_read_leaf() {
    let (_tmp, store) = seeded();
    let env = ok(&store, r#"leaf read "Crown Vault" Treasury traps "Poison Needle""#);
    assert_eq!(env.code, Code::Read);
    assert_eq!(env.command.name, "leaf.read");
    assert_eq!(env.target.path, "/Crown Vault/Treasury/traps/Poison Needle");

    let leaf = &env.result["leaf"];
    assert_eq!(leaf["summary"], "Hidden in the lock");
    assert_eq!(leaf["tags"], serde_json::json!(["trap", "poison"]));
    assert_eq!(leaf["metadata"]["dc"], 15);
    assert_eq!(leaf["metadata"]["reset"], true);

    let env = ok(&store, r#"leaf read "Crown Vault" Treasury treasures "Ruby Crown""#);
    assert_eq!(env.result["leaf"]["summary"], "A crown, heavy with rubies");
}

#[test]
fn test_comment_and_blank_lines_yield_nothing() {
    let (_tmp, store) = test_store();
    assert!(execute_line(&store, Some("gm"), "   ").is_none());
    assert!(execute_line(&store, Some("gm"), "# collection create Nope").is_none());
}

#[test]
fn test_parse_errors() {
    let (_tmp, store) = test_store();

    let env = exec(&store, "dance wildly");
    assert_eq!(env.code, Code::ErrorParse);
    assert!(env.message.contains("Unknown command"));

    let env = exec(&store, "leaf fly A B traps C");
    assert_eq!(env.code, Code::ErrorParse);
    assert!(env.message.contains("Expected one of"));

    let env = exec(&store, r#"leaf create "Crown Vault" Treasury traps"#);
    assert_eq!(env.code, Code::ErrorParse);
    assert!(env.message.contains("Usage: leaf create"));
    assert_eq!(env.target.path, "/Crown Vault/Treasury/traps");
}

#[test]
fn test_missing_owner_is_validation_error() {
    let (_tmp, store) = test_store();
    let env = execute_line(&store, None, "collection create Keep").unwrap();
    assert_eq!(env.code, Code::ErrorValidation);
}

#[test]
fn test_bare_tokens_after_fields_warn() {
    let (_tmp, store) = test_store();
    ok(&store, "collection create Keep");
    ok(&store, "container create Keep Hall");
    let env = ok(&store, "leaf create Keep Hall enemies Ogre tags=big stray");
    let warnings = &env.diagnostics.as_ref().unwrap().warnings;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("'stray'"));

    let env = ok(&store, "leaf read Keep Hall enemies Ogre");
    assert!(env.result["leaf"]["summary"].is_null());
}

#[test]
fn test_names_with_slashes_are_rejected() {
    let (_tmp, store) = test_store();
    let env = exec(&store, r#"collection create "A/B""#);
    assert_eq!(env.code, Code::ErrorValidation);
}

#[test]
fn test_update_and_rename() {
    let (_tmp, store) = seeded();
    let env = ok(
        &store,
        r#"leaf update "Crown Vault" Treasury traps "Poison Needle" notes="Save DC 15" meta=damage=2d6"#,
    );
    assert_eq!(env.code, Code::Updated);
    assert_eq!(env.result["leaf"]["metadata"]["damage"], "2d6");
    assert_eq!(env.result["leaf"]["metadata"]["dc"], 15);

    let env = ok(&store, r#"container rename "Crown Vault" Treasury Vaults"#);
    assert_eq!(env.code, Code::Renamed);
    ok(&store, r#"leaf read "Crown Vault" Vaults traps "Poison Needle""#);
}

#[test]
fn test_delete_requires_token() {
    let (_tmp, store) = seeded();
    let env = exec(&store, r#"leaf delete "Crown Vault" Treasury traps "Poison Needle""#);
    assert_eq!(env.code, Code::ErrorUnsafe);
    assert_eq!(
        env.result["token_hint"],
        "DELETE:/Crown Vault/Treasury/traps/Poison Needle"
    );

    let env = ok(
        &store,
        r#"leaf delete "Crown Vault" Treasury traps "Poison Needle" token="DELETE:/Crown Vault/Treasury/traps/Poison Needle""#,
    );
    assert_eq!(env.code, Code::DeletedHard);

    let env = ok(&store, r#"collection delete "Crown Vault" token="DELETE:/Crown Vault""#);
    assert_eq!(env.code, Code::DeletedHard);
    let env = ok(&store, "collection list");
    assert_eq!(env.result["collections"], serde_json::json!([]));
}

#[test]
fn test_move_and_copy_lines() {
    let (_tmp, store) = seeded();
    ok(&store, r#"container create "Crown Vault" Armory"#);

    let env = ok(
        &store,
        r#"leaf copy "Crown Vault" Treasury traps "Poison Needle" "Crown Vault" Armory traps new_name="Spare Needle""#,
    );
    assert_eq!(env.code, Code::Copied);
    assert_eq!(env.result["to"], "/Crown Vault/Armory/traps/Spare Needle");

    let env = exec(
        &store,
        r#"leaf move "Crown Vault" Treasury traps "Poison Needle" "Crown Vault" Armory traps"#,
    );
    assert_eq!(env.code, Code::Moved);

    ok(&store, r#"leaf create "Crown Vault" Treasury traps "Poison Needle""#);
    let env = exec(
        &store,
        r#"leaf move "Crown Vault" Treasury traps "Poison Needle" "Crown Vault" Armory traps"#,
    );
    assert_eq!(env.code, Code::ErrorConflict);
    let env = exec(
        &store,
        r#"leaf move "Crown Vault" Treasury traps "Poison Needle" "Crown Vault" Armory traps overwrite"#,
    );
    assert_eq!(env.code, Code::Moved);
}

#[test]
fn test_search_with_tags() {
    let (_tmp, store) = seeded();
    let env = ok(&store, "search crown");
    assert_eq!(env.result["matches"].as_array().unwrap().len(), 1);

    let env = ok(&store, "search e tags=poison,undead");
    let matches = env.result["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["name"], "Poison Needle");

    let env = ok(&store, r#"search needle collection="Crown Vault" tags=loot"#);
    assert_eq!(env.result["matches"], serde_json::json!([]));
}

#[test]
fn test_stat_and_list_utilities() {
    let (_tmp, store) = seeded();
    let env = ok(&store, r#"stat "Crown Vault" Treasury"#);
    assert_eq!(env.result["node"]["type"], "container");

    let env = ok(&store, r#"list "Crown Vault" Treasury traps"#);
    assert_eq!(env.result["leaves"].as_array().unwrap().len(), 1);

    let env = ok(&store, r#"category ensure "Crown Vault" Treasury puzzles"#);
    assert_eq!(env.code, Code::Ensured);
}

#[test]
fn test_batch_summary_counts() {
    let (_tmp, store) = test_store();
    let script = "\
# header
collection create Keep

container create Keep Hall
container create Keep Hall
leaf read Keep Hall traps Missing
";
    let batch = execute_script(&store, Some("gm"), "keep.dsl", script);
    assert_eq!(batch.file, "keep.dsl");
    assert_eq!(batch.code, Code::Batch);
    assert_eq!(batch.status, Status::Error);
    assert_eq!(batch.summary.lines_total, 6);
    assert_eq!(batch.summary.ok, 2);
    assert_eq!(batch.summary.error, 2);
    assert_eq!(batch.summary.skipped, 2);
    assert_eq!(batch.results.len(), 4);
    assert_eq!(batch.results[2].code, Code::ErrorConflict);
    assert_eq!(batch.results[3].code, Code::ErrorNotFound);
}

#[test]
fn test_execute_file_and_import() {
    let (tmp, store) = seeded();

    let env = ok(&store, r#"export "Crown Vault""#);
    let tree = env.result["collection"].clone();
    let export_path = tmp.path().join("crown.json");
    fs::write(&export_path, serde_json::to_string_pretty(&tree).unwrap()).unwrap();

    let script_path = tmp.path().join("import.dsl");
    fs::write(
        &script_path,
        format!(
            "import \"{0}\"\nimport \"{0}\" strategy=rename\n",
            export_path.display()
        ),
    )
    .unwrap();

    let batch = execute_file(&store, Some("gm"), &script_path).unwrap();
    assert_eq!(batch.status, Status::Ok);
    assert_eq!(batch.results[0].code, Code::Noop);
    assert_eq!(batch.results[1].code, Code::Created);
    assert_eq!(batch.results[1].result["collection"]["name"], "Crown Vault-2");

    ok(&store, r#"leaf read "Crown Vault-2" Treasury traps "Poison Needle""#);

    let env = exec(&store, r#"import "/no/such/file.json""#);
    assert_eq!(env.code, Code::ErrorNotFound);
    let env = exec(&store, &format!("import \"{}\" strategy=merge", export_path.display()));
    assert_eq!(env.code, Code::ErrorValidation);
}

#[test]
fn test_missing_script_file_is_an_error() {
    let (tmp, store) = test_store();
    assert!(execute_file(&store, Some("gm"), &tmp.path().join("absent.dsl")).is_err());
}

#[test]
fn test_capitalised_flag_words_are_names() {
    let (_tmp, store) = test_store();
    let env = ok(&store, "collection create Overwrite");
    assert_eq!(env.target.path, "/Overwrite");
    ok(&store, "container create Overwrite Hall");

    let env = ok(&store, "leaf create Overwrite Hall traps Trap Exists_OK");
    assert_eq!(env.result["leaf"]["summary"], "Exists_OK");

    let env = exec(&store, "leaf create Overwrite Hall traps Trap exists_ok");
    assert_eq!(env.code, Code::Noop);
}

#[test]
fn test_update_name_stays_text() {
    let (_tmp, store) = seeded();
    let env = ok(&store, r#"leaf update "Crown Vault" Treasury traps "Poison Needle" name=2024"#);
    assert_eq!(env.result["leaf"]["name"], "2024");
    let env = ok(&store, r#"leaf update "Crown Vault" Treasury traps 2024 name=yes"#);
    assert_eq!(env.result["leaf"]["name"], "yes");
    ok(&store, r#"leaf read "Crown Vault" Treasury traps yes"#);
}
