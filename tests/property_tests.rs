//! Property-Based Tests for scenegraft
//!
//! Uses proptest for testing invariants of graph construction and naming:
//! - Membership does not depend on list order
//! - Unnamed entries never reach the registry or the host
//! - Generated collection names and backing files never collide
//! - Token substitution leaves no marker behind

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};

use scenegraft::host::memory::MemoryHost;
use scenegraft::tokens::{IDENTITY_TOKEN, PATH_TOKEN};
use scenegraft::{
    BuildPolicy, Built, GraphBuilder, ListRole, NamingRules, SuffixStyle, TokenSet,
    unique_backing_id, unique_container_name,
};

fn build(sources: &[Value]) -> (Arc<MemoryHost>, Built) {
    let host = Arc::new(MemoryHost::new());
    let tokens = TokenSet::new("/pkg", "abc123");
    let built = GraphBuilder::new(host.clone(), &tokens, BuildPolicy::private_preview())
        .with_list("sources", ListRole::Objects, sources)
        .build()
        .expect("build should succeed");
    (host, built)
}

fn studio() -> Vec<Value> {
    vec![
        json!({"id": "scene", "name": "Main", "settings": {"items": [{"name": "Cam"}, {"name": "Hud"}, {"name": "Mic"}]}}),
        json!({"id": "scene", "name": "Brb", "settings": {"items": [{"name": "Logo"}, {"name": "Ghost"}]}}),
        json!({"id": "group", "name": "Hud", "settings": {"items": [{"name": "Logo"}, {"name": "Clock"}]}}),
        json!({"id": "video_capture", "name": "Cam"}),
        json!({"id": "audio_input", "name": "Mic"}),
        json!({"id": "image_source", "name": "Logo"}),
        json!({"id": "text_source", "name": "Clock"}),
        json!({"id": "text_source"}),
    ]
}

// =============================================================================
// Graph construction
// =============================================================================

/// Strategy for an entry that may or may not carry a name
fn entry_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::weighted(0.7, "[A-Za-z][A-Za-z0-9 ]{0,7}")
}

proptest! {
    /// Every permutation of the entry list links the same members
    #[test]
    fn membership_is_order_independent(shuffled in Just(studio()).prop_shuffle()) {
        let (_, reference) = build(&studio());
        let (_, permuted) = build(&shuffled);

        for name in ["Main", "Brb", "Hud"] {
            prop_assert_eq!(
                reference.graph.member_names(name),
                permuted.graph.member_names(name)
            );
        }
        prop_assert_eq!(reference.graph.scene_names(), permuted.graph.scene_names());
        prop_assert_eq!(reference.report.linked_members, permuted.report.linked_members);
    }

    /// Only named entries are created and registered
    #[test]
    fn unnamed_entries_never_registered(names in prop::collection::vec(entry_strategy(), 0..16)) {
        let sources: Vec<Value> = names
            .iter()
            .map(|name| match name {
                Some(name) => json!({"id": "text_source", "name": name}),
                None => json!({"id": "text_source"}),
            })
            .collect();
        let (host, built) = build(&sources);

        let named: Vec<&String> = names.iter().flatten().collect();
        let distinct: HashSet<&String> = named.iter().copied().collect();

        prop_assert_eq!(host.created_count(), named.len());
        prop_assert_eq!(built.graph.len(), named.len());
        prop_assert_eq!(built.graph.registry().len(), distinct.len());
        for (_, object) in built.graph.objects() {
            prop_assert!(!object.name.is_empty());
        }
    }
}

// =============================================================================
// Naming
// =============================================================================

fn rules_strategy() -> impl Strategy<Value = NamingRules> {
    (
        prop_oneof![Just(SuffixStyle::Spaced), Just(SuffixStyle::Parenthesized)],
        1u32..4,
    )
        .prop_map(|(suffix_style, first_ordinal)| NamingRules {
            suffix_style,
            first_ordinal,
            ..NamingRules::default()
        })
}

proptest! {
    /// The chosen collection name is never one that already exists
    #[test]
    fn container_name_is_unique(
        existing in prop::collection::vec("Main( [0-9])?|Main \\([0-9]\\)", 0..12),
        rules in rules_strategy(),
    ) {
        let chosen = unique_container_name("Main", &existing, &rules);
        prop_assert!(!existing.contains(&chosen));
        prop_assert!(chosen.starts_with("Main"));
    }

    /// The chosen backing file never matches an existing stem, ignoring case
    #[test]
    fn backing_id_is_unique(
        listing in prop::collection::vec("[Mm][Aa]in(_[0-9])?\\.json", 0..12),
    ) {
        let chosen = unique_backing_id("Main", &listing, &NamingRules::default());
        let stem = chosen.file_stem().unwrap().to_string_lossy().to_lowercase();
        for file in &listing {
            let taken = Path::new(file).file_stem().unwrap().to_string_lossy().to_lowercase();
            prop_assert_ne!(&stem, &taken);
        }
        prop_assert_eq!(chosen.extension().unwrap(), "json");
    }

    /// Sanitized stems only contain filesystem-safe characters
    #[test]
    fn backing_id_is_filesystem_safe(desired in "\\PC{0,24}") {
        let chosen = unique_backing_id(&desired, Vec::<String>::new(), &NamingRules::default());
        let stem = chosen.file_stem().unwrap().to_string_lossy().into_owned();
        prop_assert!(!stem.is_empty());
        prop_assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }
}

// =============================================================================
// Token substitution
// =============================================================================

proptest! {
    /// After substitution no marker is left in the string, including markers
    /// that only appear once an inner marker has been removed
    #[test]
    fn substitution_removes_every_marker(
        parts in prop::collection::vec(
            prop_oneof![
                "[a-z/.?=&<>|]{0,6}",
                Just(PATH_TOKEN.to_string()),
                Just(IDENTITY_TOKEN.to_string()),
                Just("<REPLACE".to_string()),
                Just("|ME>".to_string()),
                Just("<machine-".to_string()),
                Just("token>".to_string()),
            ],
            0..12,
        ),
        base in "(/[0-9]{1,8})?",
        identity in "[0-9]{0,12}",
    ) {
        let text: String = parts.concat();
        let tokens = TokenSet::new(base.clone(), identity.clone());
        match tokens.substitute_str(&text) {
            Some(out) => {
                prop_assert!(!out.contains(PATH_TOKEN));
                prop_assert!(!out.contains(IDENTITY_TOKEN));
            }
            None => {
                prop_assert!(!text.contains(PATH_TOKEN));
                prop_assert!(!text.contains(IDENTITY_TOKEN));
            }
        }
    }
}
