use clap::Parser;
use sitepipe::cli::{BuildOptions, CliArgs, Command};

const DEFAULTS: BuildOptions = BuildOptions { no_clean: false };

#[test]
fn no_subcommand_means_serve() {
    let args = CliArgs::try_parse_from(["sitepipe"]).unwrap();
    assert_eq!(args.command(), Command::Serve(DEFAULTS));
    assert_eq!(args.config, "Sitepipe.toml");
    assert!(!args.dry_run);
    assert!(args.command().watches());
}

#[test]
fn global_flags_work_after_the_subcommand() {
    let args = CliArgs::try_parse_from([
        "sitepipe",
        "build",
        "--config",
        "site/Sitepipe.toml",
        "--no-clean",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(args.command(), Command::Build(BuildOptions { no_clean: true }));
    assert!(!args.command().watches());
    assert_eq!(args.config, "site/Sitepipe.toml");
    assert!(args.log_level.is_some());
}

#[test]
fn every_subcommand_parses() {
    for (word, command, watches) in [
        ("build", Command::Build(DEFAULTS), false),
        ("watch", Command::Watch(DEFAULTS), true),
        ("serve", Command::Serve(DEFAULTS), true),
        ("clean", Command::Clean, false),
    ] {
        let args = CliArgs::try_parse_from(["sitepipe", word, "--dry-run"]).unwrap();
        assert_eq!(args.command(), command);
        assert_eq!(args.command().watches(), watches);
        assert!(args.dry_run);
    }
}

#[test]
fn no_clean_belongs_to_building_commands_only() {
    for word in ["build", "watch", "serve"] {
        let args = CliArgs::try_parse_from(["sitepipe", word, "--no-clean"]).unwrap();
        assert_eq!(
            args.command().build_options(),
            Some(BuildOptions { no_clean: true })
        );
    }

    assert!(CliArgs::try_parse_from(["sitepipe", "clean", "--no-clean"]).is_err());
    assert!(CliArgs::try_parse_from(["sitepipe", "--no-clean"]).is_err());
    assert_eq!(Command::Clean.build_options(), None);
}

#[test]
fn unknown_log_level_is_rejected() {
    assert!(CliArgs::try_parse_from(["sitepipe", "--log-level", "loud"]).is_err());
}
