use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use covenant::logging::DELIMITER;
use covenant_chain::{
    ActorId, ChainFile, ChainIntegrityError, EventData, Ledger, LogicalClock, PendingCommit,
};
use covenant_cli::commands::{config, render, verify};
use covenant_cli::error::CliError;
use covenant_cli::{Cli, Commands};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn saved_chain(dir: &Path) -> (PathBuf, ChainFile) {
    let ledger = Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch()));
    let actor = ActorId::from("appender");
    ledger.append(PendingCommit::new(actor.clone(), EventData::Init { state: vec![0] }));
    for byte in 1..=3u8 {
        let mut state = ledger.chain(&actor).last().expect("tip").data.state().to_vec();
        state.push(byte);
        ledger.append(PendingCommit::new(
            actor.clone(),
            EventData::MessageHandled {
                message: vec![byte],
                state,
            },
        ));
    }

    let file = ChainFile::new(actor.clone(), ledger.chain(&actor));
    let path = dir.join("appender.json");
    file.save(&path).expect("save");
    (path, file)
}

#[test]
fn test_verify_reports_intact_chain() {
    let dir = TempDir::new().expect("temp dir");
    let (path, file) = saved_chain(dir.path());

    let summary = verify::verify_file(&path).expect("intact");
    assert_eq!(summary.actor, "appender");
    assert_eq!(summary.records, 4);
    assert_eq!(summary.tip, Some(file.records[3].hash.to_string()));
}

#[test]
fn test_verify_names_the_tampered_record() {
    let dir = TempDir::new().expect("temp dir");
    let (path, mut file) = saved_chain(dir.path());

    file.records[2].data = EventData::MessageHandled {
        message: vec![2],
        state: vec![9, 9, 9],
    };
    file.save(&path).expect("overwrite");

    let err = verify::verify_file(&path).expect_err("tampered");
    match &err {
        CliError::Integrity {
            index,
            hash,
            source,
            ..
        } => {
            assert_eq!(*index, 2);
            assert_eq!(hash, &file.records[2].hash.to_string());
            assert!(matches!(source, ChainIntegrityError::HashMismatch { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.user_message().contains("record 2"));
}

#[test]
fn test_verify_reports_unreadable_files() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("missing.json");
    let err = verify::verify_file(&path).expect_err("missing");
    assert!(matches!(err, CliError::ChainLoad { .. }));

    std::fs::write(&path, "not json").expect("write");
    let err = verify::verify_file(&path).expect_err("garbage");
    assert!(matches!(err, CliError::ChainLoad { .. }));
}

#[test]
fn test_render_prints_commit_blocks() {
    let dir = TempDir::new().expect("temp dir");
    let (path, file) = saved_chain(dir.path());

    let rendered = render::render_file(&path, false).expect("render");
    for record in &file.records {
        assert!(rendered.contains(&format!("CHAIN COMMIT #{}", record.hash)));
    }
    assert_eq!(rendered.matches("TYPE: MESSAGE_HANDLED").count(), 3);
    assert_eq!(rendered.matches(DELIMITER).count(), 8);
    assert!(rendered.starts_with(DELIMITER));
    assert!(rendered.ends_with(DELIMITER));
}

#[test]
fn test_render_refuses_tampered_chain_unless_asked() {
    let dir = TempDir::new().expect("temp dir");
    let (path, mut file) = saved_chain(dir.path());
    file.records.remove(1);
    file.save(&path).expect("overwrite");

    let err = render::render_file(&path, false).expect_err("broken link");
    assert!(matches!(err, CliError::Integrity { index: 1, .. }));

    let rendered = render::render_file(&path, true).expect("rendered anyway");
    assert_eq!(rendered.matches("CHAIN COMMIT #").count(), 3);
}

#[test]
fn test_config_validation() {
    let dir = TempDir::new().expect("temp dir");
    let good = dir.path().join("good.toml");
    std::fs::write(
        &good,
        "[logging]\nlevel = \"warn\"\n\n[logging.queue]\ncapacity = 8\npolicy = \"block\"\n",
    )
    .expect("write");
    let loaded = config::load_config(&good).expect("valid");
    assert_eq!(loaded.logging.queue.capacity, 8);
    let described = config::describe(&loaded);
    assert!(described.iter().any(|l| l.contains("WARN")));
    assert!(described.iter().any(|l| l.contains("8 entries, Block when full")));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[logging]\noutput = \"file\"\n").expect("write");
    let err = config::load_config(&bad).expect_err("file output needs a path");
    assert!(matches!(err, CliError::InvalidConfig { .. }));
}

#[test]
fn test_cli_parses_subcommands() {
    let cli = Cli::try_parse_from(["covenant", "--json", "verify", "chain.json"]).expect("parse");
    assert!(cli.json);
    match cli.command {
        Commands::Verify(args) => assert_eq!(args.file, PathBuf::from("chain.json")),
        other => panic!("unexpected command: {:?}", other),
    }

    let cli = Cli::try_parse_from(["covenant", "render", "--unverified", "chain.json"])
        .expect("parse");
    assert!(matches!(cli.command, Commands::Render(ref args) if args.unverified));

    assert!(Cli::try_parse_from(["covenant", "verify"]).is_err());
}
