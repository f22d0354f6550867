use super::*;

fn raw_with_mail() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.mail.username = Some("relay@example.org".to_string());
    raw.mail.password = Some("app-password".to_string());
    raw.mail.recipient = Some("owner@example.org".to_string());
    raw
}

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(raw_with_mail()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.mode, ServerMode::Development);
    assert!(settings.server.tls.is_none());
    assert_eq!(settings.server.max_body_bytes.get(), 100 * 1024);
    assert_eq!(settings.cors.allowed_origin, "http://localhost:3000");
    assert_eq!(settings.rate_limit.window_seconds.get(), 900);
    assert_eq!(settings.rate_limit.max_requests.get(), 100);
    assert!(!settings.rate_limit.trust_forwarded_for);
    assert_eq!(settings.mail.provider, MailProvider::Gmail);
    assert_eq!(settings.mail.timeout, Duration::from_secs(30));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_mail();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        port: Some(4321),
        log_level: Some("debug".to_string()),
        rate_limit_max_requests: Some(5),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.rate_limit.max_requests.get(), 5);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = raw_with_mail();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn mail_credentials_are_required() {
    for key in ["mail.username", "mail.password", "mail.recipient"] {
        let mut raw = raw_with_mail();
        match key {
            "mail.username" => raw.mail.username = None,
            "mail.password" => raw.mail.password = Some(String::new()),
            _ => raw.mail.recipient = None,
        }

        let err = Settings::from_raw(raw).expect_err("missing credential");
        assert!(
            matches!(err, LoadError::Invalid { key: reported, .. } if reported == key),
            "unexpected error for {key}: {err}"
        );
    }
}

#[test]
fn recipient_must_be_an_address() {
    let mut raw = raw_with_mail();
    raw.mail.recipient = Some("owner".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid recipient");
    assert!(err.to_string().contains("mail.recipient"));
}

#[test]
fn production_mode_requires_tls_paths() {
    let mut raw = raw_with_mail();
    raw.server.mode = Some("production".to_string());
    raw.tls.key_path = Some(PathBuf::from("/etc/ssl/privkey.pem"));
    raw.tls.cert_path = Some(PathBuf::from("/etc/ssl/cert.pem"));

    let err = Settings::from_raw(raw.clone()).expect_err("chain missing");
    assert!(err.to_string().contains("tls.chain_path"));

    raw.tls.chain_path = Some(PathBuf::from("/etc/ssl/chain.pem"));
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.server.mode, ServerMode::Production);
    assert_eq!(
        settings.server.tls.map(|tls| tls.chain_path),
        Some(PathBuf::from("/etc/ssl/chain.pem"))
    );
}

#[test]
fn tls_paths_are_ignored_in_development() {
    let mut raw = raw_with_mail();
    raw.tls.key_path = Some(PathBuf::from("/etc/ssl/privkey.pem"));

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.server.tls.is_none());
}

#[test]
fn unknown_mode_is_rejected() {
    let mut raw = raw_with_mail();
    raw.server.mode = Some("staging".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown mode");
    assert!(err.to_string().contains("server.mode"));
}

#[test]
fn allowed_origin_is_reduced_to_its_origin() {
    let mut raw = raw_with_mail();
    raw.cors.allowed_origin = Some("https://Example.org/contact/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cors.allowed_origin, "https://example.org");
}

#[test]
fn non_http_origin_is_rejected() {
    let mut raw = raw_with_mail();
    raw.cors.allowed_origin = Some("ftp://example.org".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_rate_limit_is_rejected() {
    let mut raw = raw_with_mail();
    raw.rate_limit.max_requests = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero max");
    assert!(err.to_string().contains("rate_limit.max_requests"));
}

#[test]
fn mail_settings_debug_redacts_password() {
    let settings = Settings::from_raw(raw_with_mail()).expect("valid settings");
    let rendered = format!("{:?}", settings.mail);

    assert!(!rendered.contains("app-password"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn provider_aliases_parse() {
    assert_eq!(MailProvider::from_str("Gmail"), Ok(MailProvider::Gmail));
    assert_eq!(MailProvider::from_str("office365"), Ok(MailProvider::Outlook));
    assert!(MailProvider::from_str("sendgrid").is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["contact-relay"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "contact-relay",
        "serve",
        "--host",
        "127.0.0.1",
        "--allowed-origin",
        "https://example.org",
        "--mode",
        "production",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.host.as_deref(), Some("127.0.0.1"));
            assert_eq!(
                serve.overrides.allowed_origin.as_deref(),
                Some("https://example.org")
            );
            assert_eq!(serve.overrides.mode.as_deref(), Some("production"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_check_arguments() {
    let args = CliArgs::parse_from(["contact-relay", "check", "--skip-smtp-probe", "--port", "9000"]);

    match args.command.expect("check command") {
        Command::Check(check) => {
            assert!(check.skip_smtp_probe);
            assert_eq!(check.overrides.port, Some(9000));
        }
        _ => panic!("wrong command parsed"),
    }
}
