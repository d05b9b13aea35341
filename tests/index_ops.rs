mod common;

use common::*;
use std::path::PathBuf;
use symdex::index::SymbolIndex;
use symdex::model::{RelationKind, RoleSet, SymbolId, SymbolKind};

fn auth_index() -> SymbolIndex {
    let mut index = SymbolIndex::new(PathBuf::from("/proj"), None);

    // lib/auth.ax: class AuthRepository { login(), token }
    index
        .update_document(
            "lib/auth.ax",
            record(
                "lib/auth.ax",
                vec![
                    sym("ax proj AuthRepository", "AuthRepository", SymbolKind::Class),
                    sym_in(
                        "ax proj AuthRepository.login",
                        "login",
                        SymbolKind::Method,
                        "ax proj AuthRepository",
                    ),
                    sym_in(
                        "ax proj AuthRepository.token",
                        "token",
                        SymbolKind::Field,
                        "ax proj AuthRepository",
                    ),
                ],
                vec![
                    def_occ(
                        "ax proj AuthRepository",
                        "lib/auth.ax",
                        range(0, 6, 0, 20),
                        Some(range(0, 0, 4, 1)),
                    ),
                    def_occ(
                        "ax proj AuthRepository.login",
                        "lib/auth.ax",
                        range(1, 2, 1, 7),
                        Some(range(1, 0, 1, 12)),
                    ),
                    def_occ(
                        "ax proj AuthRepository.token",
                        "lib/auth.ax",
                        range(2, 2, 2, 7),
                        Some(range(2, 0, 2, 12)),
                    ),
                ],
                vec![rel(
                    "ax proj AuthRepository",
                    "ax proj Repository",
                    RelationKind::Extends,
                )],
            ),
        )
        .unwrap();

    // lib/service.ax: fn startup calls login, imports AuthRepository
    index
        .update_document(
            "lib/service.ax",
            record(
                "lib/service.ax",
                vec![sym("ax proj startup", "startup", SymbolKind::Function)],
                vec![
                    def_occ(
                        "ax proj startup",
                        "lib/service.ax",
                        range(0, 3, 0, 10),
                        Some(range(0, 0, 3, 1)),
                    ),
                    occ(
                        "ax proj AuthRepository",
                        "lib/service.ax",
                        range(1, 4, 1, 18),
                        RoleSet::IMPORT,
                    ),
                    occ(
                        "ax proj AuthRepository.login",
                        "lib/service.ax",
                        range(2, 4, 2, 9),
                        RoleSet::CALL | RoleSet::READ_ACCESS,
                    ),
                ],
                vec![],
            ),
        )
        .unwrap();

    index
}

#[test]
fn definition_lookup_is_exact() {
    let index = auth_index();
    let id = SymbolId::from("ax proj AuthRepository");
    let def = index.find_definition(&id).unwrap();
    assert_eq!(def.file, "lib/auth.ax");
    assert!(def.roles.contains(RoleSet::DEFINITION));
    assert_eq!(def.range.start_line, 0);

    assert!(index
        .find_definition(&SymbolId::from("ax proj Missing"))
        .is_none());
}

#[test]
fn references_include_definition_in_path_position_order() {
    let index = auth_index();
    let refs = index.find_references(&SymbolId::from("ax proj AuthRepository.login"));
    assert_eq!(refs.len(), 2);
    // lib/auth.ax sorts before lib/service.ax.
    assert_eq!(refs[0].file, "lib/auth.ax");
    assert!(refs[0].roles.contains(RoleSet::DEFINITION));
    assert_eq!(refs[1].file, "lib/service.ax");
    assert!(refs[1].roles.contains(RoleSet::CALL));
}

#[test]
fn find_symbols_globs_with_smart_case() {
    let index = auth_index();

    let hits = index.find_symbols("Auth*");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].display_name, "AuthRepository");

    // All-lowercase patterns are case-insensitive.
    assert_eq!(index.find_symbols("authrepo*").len(), 1);
    assert_eq!(index.find_symbols("login").len(), 1);
    // Uppercase anywhere makes it exact-case.
    assert!(index.find_symbols("AUTHREPO*").is_empty());

    assert_eq!(index.find_symbols("*").len(), 4);
    assert_eq!(index.find_symbols("?ogin").len(), 1);
}

#[test]
fn members_keep_source_order() {
    let index = auth_index();
    let members = index.members_of(&SymbolId::from("ax proj AuthRepository"));
    let names: Vec<&str> = members.iter().map(|m| m.display_name.as_str()).collect();
    assert_eq!(names, vec!["login", "token"]);
}

#[test]
fn find_qualified_requires_matching_member() {
    let index = auth_index();
    let hits = index.find_qualified("AuthRepository", "login");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, SymbolKind::Method);

    assert!(index.find_qualified("AuthRepository", "logout").is_empty());
    assert!(index.find_qualified("Nothing", "login").is_empty());

    // Container may also be an exact SymbolId.
    assert_eq!(
        index
            .find_qualified("ax proj AuthRepository", "token")
            .len(),
        1
    );
}

#[test]
fn hierarchy_edges_come_from_relationships() {
    let index = auth_index();
    let supers = index.supertype_ids(&SymbolId::from("ax proj AuthRepository"));
    assert_eq!(supers, vec![SymbolId::from("ax proj Repository")]);

    let subs = index.subtype_ids(&SymbolId::from("ax proj Repository"));
    assert_eq!(subs, vec![SymbolId::from("ax proj AuthRepository")]);
}

#[test]
fn call_graph_derives_from_enclosing_ranges() {
    let index = auth_index();

    let calls = index.call_target_ids(&SymbolId::from("ax proj startup"));
    assert_eq!(calls, vec![SymbolId::from("ax proj AuthRepository.login")]);

    let callers = index.caller_ids(&SymbolId::from("ax proj AuthRepository.login"));
    assert_eq!(callers, vec![SymbolId::from("ax proj startup")]);

    let resolved = index.get_callers(&SymbolId::from("ax proj AuthRepository.login"));
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].display_name, "startup");
}

#[test]
fn remove_document_prunes_every_derivation() {
    let mut index = auth_index();
    assert!(index.remove_document("lib/auth.ax"));

    // No symbol, occurrence, or relationship from the removed file survives.
    assert!(index
        .get_symbol(&SymbolId::from("ax proj AuthRepository"))
        .is_none());
    assert!(index
        .find_definition(&SymbolId::from("ax proj AuthRepository.login"))
        .is_none());
    assert!(index.find_symbols("AuthRepository").is_empty());
    assert!(index
        .members_of(&SymbolId::from("ax proj AuthRepository"))
        .is_empty());
    assert!(index
        .supertype_ids(&SymbolId::from("ax proj AuthRepository"))
        .is_empty());
    assert_eq!(index.files(), vec!["lib/service.ax"]);

    // The service file's occurrences of the now-foreign symbol remain; they
    // are unresolved references, not dangling derivations.
    let refs = index.find_references(&SymbolId::from("ax proj AuthRepository.login"));
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].file, "lib/service.ax");

    assert!(!index.remove_document("lib/auth.ax"));
}

#[test]
fn repeated_update_is_idempotent() {
    let mut index = auth_index();
    let before_stats = index.stats();
    let before_refs = index.find_references(&SymbolId::from("ax proj AuthRepository.login"));

    let replay = index.document("lib/auth.ax").unwrap().clone();
    index.update_document("lib/auth.ax", replay).unwrap();

    let after = index.stats();
    assert_eq!(before_stats.files, after.files);
    assert_eq!(before_stats.symbols, after.symbols);
    assert_eq!(before_stats.references, after.references);
    assert_eq!(before_stats.definitions, after.definitions);
    assert_eq!(
        before_refs,
        index.find_references(&SymbolId::from("ax proj AuthRepository.login"))
    );
}

#[test]
fn update_replaces_prior_facts_atomically() {
    let mut index = auth_index();
    let symbols_before = index.stats().symbols;

    // Rename AuthRepository -> SessionRepository in place.
    index
        .update_document(
            "lib/auth.ax",
            record(
                "lib/auth.ax",
                vec![sym(
                    "ax proj SessionRepository",
                    "SessionRepository",
                    SymbolKind::Class,
                )],
                vec![def_occ(
                    "ax proj SessionRepository",
                    "lib/auth.ax",
                    range(0, 6, 0, 23),
                    Some(range(0, 0, 4, 1)),
                )],
                vec![],
            ),
        )
        .unwrap();

    assert!(index.find_symbols("AuthRepository").is_empty());
    assert_eq!(index.find_symbols("SessionRepository").len(), 1);
    // Two members vanished with the old record, one class replaced another.
    assert_eq!(index.stats().symbols, symbols_before - 2);
}

#[test]
fn stats_reflect_documents() {
    let index = auth_index();
    let stats = index.stats();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.symbols, 4);
    assert_eq!(stats.definitions, 4);
    assert_eq!(stats.references, 6);
}

#[test]
fn occurrence_with_foreign_path_is_rejected() {
    let mut index = SymbolIndex::new(PathBuf::from("/proj"), None);
    let bad = record(
        "lib/a.ax",
        vec![],
        vec![occ("ax proj X", "lib/b.ax", range(0, 0, 0, 1), RoleSet::IMPORT)],
        vec![],
    );
    assert!(index.update_document("lib/a.ax", bad).is_err());
    // Nothing was inserted.
    assert!(index.files().is_empty());
}

#[test]
fn definition_of_undeclared_symbol_is_rejected() {
    let mut index = SymbolIndex::new(PathBuf::from("/proj"), None);
    let bad = record(
        "lib/a.ax",
        vec![sym("ax proj Declared", "Declared", SymbolKind::Class)],
        vec![
            def_occ("ax proj Declared", "lib/a.ax", range(0, 0, 0, 8), None),
            def_occ("ax proj Phantom", "lib/a.ax", range(1, 0, 1, 7), None),
        ],
        vec![],
    );
    assert!(index.update_document("lib/a.ax", bad).is_err());
    assert!(index.files().is_empty());
    assert!(index
        .get_symbol(&SymbolId::from("ax proj Declared"))
        .is_none());

    // The same symbol referenced without the definition role is fine: it is
    // an unresolved cross-index reference, not malformed facts.
    let good = record(
        "lib/a.ax",
        vec![sym("ax proj Declared", "Declared", SymbolKind::Class)],
        vec![
            def_occ("ax proj Declared", "lib/a.ax", range(0, 0, 0, 8), None),
            occ("ax sdk List", "lib/a.ax", range(1, 0, 1, 4), RoleSet::IMPORT),
        ],
        vec![],
    );
    assert!(index.update_document("lib/a.ax", good).is_ok());
    assert_eq!(index.files(), vec!["lib/a.ax"]);
}
