//! End-to-end matching scenarios against an in-memory catalog.

use forge_sync::evidence::InstallEvidence;
use forge_sync::forge::ForgeMod;
use forge_sync::mapping::parse_mapping_content;
use forge_sync::matcher::{tuning, InstallInfo, MatchMethod, MatchOutcome, Matcher};
use forge_sync::test_support::MockCatalog;

fn entry(id: u64, guid: &str, slug: &str, name: &str) -> ForgeMod {
    ForgeMod {
        id,
        guid: guid.to_string(),
        slug: slug.to_string(),
        name: name.to_string(),
        owner: None,
        thumbnail: None,
        teaser: None,
        detail_url: None,
        releases: Vec::new(),
        assets: Vec::new(),
    }
}

#[tokio::test]
async fn versioned_folder_fuzzy_matches_despite_long_catalog_title() {
    let catalog = MockCatalog::with_entries(vec![entry(
        1,
        "com.turbodestroyer.croupier",
        "croupier-loadout-generator",
        "Croupier - loadout generator + flea quicksell",
    )]);
    let mut matcher = Matcher::new(&catalog);

    let install = InstallInfo::from_folder("Croupier_2_0_4");
    let evidence = InstallEvidence::default();

    match matcher.match_install(&install, &evidence, &[]).await {
        MatchOutcome::Matched {
            entry, confidence, ..
        } => {
            assert_eq!(entry.guid, "com.turbodestroyer.croupier");
            let fuzzy_floor =
                (tuning::MIN_FUZZY_SCORE as f64 * tuning::FUZZY_CONFIDENCE_SCALE).floor() as u8;
            assert!(
                confidence >= fuzzy_floor,
                "confidence {} below fuzzy floor {}",
                confidence,
                fuzzy_floor
            );
        }
        MatchOutcome::Unmatched => panic!("expected a match for Croupier_2_0_4"),
    }
}

#[tokio::test]
async fn exact_name_beats_spurious_search_result() {
    // the name search returns an unrelated entry alongside the real one
    let catalog = MockCatalog::with_entries(vec![
        entry(
            2,
            "com.some.other",
            "botcallsigns-voices",
            "BotCallsigns Voice Pack",
        ),
        entry(3, "com.harmonyzt.botcallsigns", "botcallsigns", "BotCallsigns"),
    ]);
    let mut matcher = Matcher::new(&catalog);

    let install = InstallInfo::from_folder("BotCallsigns");
    // binary evidence carries an identifier the portal has no entry for
    let evidence = InstallEvidence {
        guid: Some("com.stale.binaryid".to_string()),
        ..Default::default()
    };

    match matcher.match_install(&install, &evidence, &[]).await {
        MatchOutcome::Matched {
            entry,
            confidence,
            method,
        } => {
            assert_eq!(entry.guid, "com.harmonyzt.botcallsigns");
            assert_eq!(confidence, tuning::EXACT_NAME_CONFIDENCE);
            assert_eq!(method, MatchMethod::ExactName);
        }
        MatchOutcome::Unmatched => panic!("expected an exact-name match"),
    }
}

#[tokio::test]
async fn mapping_override_beats_spurious_binary_guid() {
    let catalog = MockCatalog::with_entries(vec![
        entry(3, "com.mpstark.dynamicmaps", "dynamicmaps", "Dynamic Maps"),
        entry(4, "com.spurious.binary", "something-else", "Something Else"),
    ]);
    let mut matcher = Matcher::new(&catalog);

    let mapping = parse_mapping_content(r#"{"DynamicMaps": "com.mpstark.dynamicmaps"}"#);
    let install = InstallInfo::from_folder("DynamicMaps");
    // the binary evidence points at the wrong catalog entry
    let evidence = InstallEvidence {
        guid: Some("com.spurious.binary".to_string()),
        ..Default::default()
    };

    match matcher.match_install(&install, &evidence, &mapping).await {
        MatchOutcome::Matched {
            entry,
            confidence,
            method,
        } => {
            assert_eq!(entry.guid, "com.mpstark.dynamicmaps");
            assert_eq!(confidence, tuning::MAX_CONFIDENCE);
            assert_eq!(method, MatchMethod::Override);
        }
        MatchOutcome::Unmatched => panic!("expected the override to win"),
    }
}

#[tokio::test]
async fn generic_guid_is_never_looked_up_directly() {
    let catalog = MockCatalog::with_entries(vec![entry(
        5,
        "com.spt.core",
        "spt-core",
        "SPT Core",
    )]);
    let mut matcher = Matcher::new(&catalog);

    let install = InstallInfo::from_folder("SomeBundledThing");
    let evidence = InstallEvidence {
        guid: Some("com.spt.core".to_string()),
        ..Default::default()
    };

    let outcome = matcher.match_install(&install, &evidence, &[]).await;
    let queries = catalog.recorded_queries();
    assert!(
        !queries.iter().any(|q| q == "guid:com.spt.core"),
        "generic guid was looked up directly: {:?}",
        queries
    );
    if let MatchOutcome::Matched { method, .. } = outcome {
        assert_ne!(method, MatchMethod::DirectGuid);
    }
}

#[tokio::test]
async fn direct_guid_hit_wins_over_search() {
    let catalog = MockCatalog::with_entries(vec![
        entry(6, "com.tyfon.uifixes", "ui-fixes", "UI Fixes"),
        entry(7, "com.other.uithing", "ui-thing", "UI Thing"),
    ]);
    let mut matcher = Matcher::new(&catalog);

    let install = InstallInfo::from_folder("Tyfon-UIFixes-5.3.0");
    let evidence = InstallEvidence {
        guid: Some("com.tyfon.uifixes".to_string()),
        ..Default::default()
    };

    match matcher.match_install(&install, &evidence, &[]).await {
        MatchOutcome::Matched {
            entry,
            confidence,
            method,
        } => {
            assert_eq!(entry.guid, "com.tyfon.uifixes");
            assert_eq!(confidence, tuning::MAX_CONFIDENCE);
            assert_eq!(method, MatchMethod::DirectGuid);
        }
        MatchOutcome::Unmatched => panic!("expected a direct guid match"),
    }
}

#[tokio::test]
async fn folder_guess_resolves_when_binary_evidence_is_absent() {
    let catalog = MockCatalog::with_entries(vec![entry(
        8,
        "com.tyfon.uifixes",
        "ui-fixes",
        "UI Fixes",
    )]);
    let mut matcher = Matcher::new(&catalog);

    let install = InstallInfo::from_folder("Tyfon-UIFixes-5.3.0");
    let evidence = InstallEvidence {
        guesses: vec!["com.tyfon.uifixes".to_string()],
        ..Default::default()
    };

    match matcher.match_install(&install, &evidence, &[]).await {
        MatchOutcome::Matched { entry, method, .. } => {
            assert_eq!(entry.guid, "com.tyfon.uifixes");
            assert_eq!(method, MatchMethod::GuessGuid);
        }
        MatchOutcome::Unmatched => panic!("expected a guess-based match"),
    }
}

#[tokio::test]
async fn unmatched_when_catalog_is_empty() {
    let catalog = MockCatalog::new();
    let mut matcher = Matcher::new(&catalog);
    let install = InstallInfo::from_folder("CompletelyUnknown-1.0.0");
    let outcome = matcher
        .match_install(&install, &InstallEvidence::default(), &[])
        .await;
    assert!(matches!(outcome, MatchOutcome::Unmatched));
}
