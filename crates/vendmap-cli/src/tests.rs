use super::*;

#[test]
fn no_command_is_an_error() {
    assert!(Cli::try_parse_from(["vendmap"]).is_err());
}

#[test]
fn parses_watch_with_filters() {
    let cli = Cli::try_parse_from([
        "vendmap",
        "watch",
        "--category",
        "multi-purpose",
        "--status",
        "out-of-order",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Watch {
            category: Some(Category::MultiPurpose),
            status: Some(OperatingStatus::OutOfOrder),
        }
    ));
}

#[test]
fn rejects_unknown_category() {
    assert!(Cli::try_parse_from(["vendmap", "list", "--category", "snacks"]).is_err());
}

#[test]
fn parses_list_defaults() {
    let cli = Cli::try_parse_from(["vendmap", "list"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::List {
            category: None,
            status: None,
            json: false,
        }
    ));
}

#[test]
fn parses_nearby_with_negative_coordinates() {
    let cli = Cli::try_parse_from(["vendmap", "nearby", "--lat", "-33.86", "--lon", "-151.2"])
        .expect("expected valid cli args");
    let Commands::Nearby { lat, lon, limit } = cli.command else {
        panic!("expected nearby");
    };
    assert!((lat + 33.86).abs() < f64::EPSILON);
    assert!((lon + 151.2).abs() < f64::EPSILON);
    assert_eq!(limit, 10);
}

#[test]
fn parses_add_with_repeated_payment_and_photo() {
    let cli = Cli::try_parse_from([
        "vendmap",
        "add",
        "--lat",
        "35.6895",
        "--lon",
        "139.6917",
        "--description",
        "Station east exit",
        "--category",
        "beverage",
        "--payment",
        "cash",
        "--payment",
        "qr-code",
        "--photo",
        "machine.jpg",
    ])
    .expect("expected valid cli args");

    let Commands::Add {
        status,
        payment_methods,
        photo,
        ..
    } = cli.command
    else {
        panic!("expected add");
    };
    assert_eq!(status, "operating");
    assert_eq!(payment_methods, vec!["cash", "qr-code"]);
    assert_eq!(photo, Some(PathBuf::from("machine.jpg")));
}

#[test]
fn add_requires_a_payment_method() {
    let result = Cli::try_parse_from([
        "vendmap",
        "add",
        "--lat",
        "1",
        "--lon",
        "2",
        "--description",
        "x",
        "--category",
        "food",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_photo_commands() {
    let cli = Cli::try_parse_from(["vendmap", "attach-photo", "abc123", "p.png"])
        .expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::AttachPhoto { ref id, .. } if id == "abc123"));

    let cli = Cli::try_parse_from(["vendmap", "delete-image", "machines/abc123/1_p.png"])
        .expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::DeleteImage { .. }));

    let cli =
        Cli::try_parse_from(["vendmap", "geotag", "p.jpg"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Geotag { .. }));
}

#[test]
fn config_reads_process_environment() {
    std::env::set_var("VENDMAP_COLLECTION", "machines_from_env");
    let config = load_config().expect("config loads");
    std::env::remove_var("VENDMAP_COLLECTION");
    assert_eq!(config.collection, "machines_from_env");
}
