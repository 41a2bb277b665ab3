use std::io::Write;

use clap::Parser;

use super::*;

#[test]
fn defaults_match_viewer_behaviour() {
    let settings = ViewerSettings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.viewer.delayed_rendering);
    assert_eq!(settings.viewer.render_delay, Duration::from_millis(200));
    assert!(settings.markdown.sanitize);
    assert!(settings.markdown.lax_headers);
    assert_eq!(settings.math.renderer, Some(MathRenderer::Katex));
    assert_eq!(settings.math.mathjax_url, DEFAULT_MATHJAX_URL);
    assert_eq!(settings.highlight.style, DEFAULT_HIGHLIGHT_STYLE);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.viewer.render_delay_ms = Some(500);
    raw.logging.level = Some("info".to_string());

    let overrides = ViewerOverrides {
        render_delay_ms: Some(50),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = ViewerSettings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.viewer.render_delay, Duration::from_millis(50));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ViewerOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = ViewerSettings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_delay_is_accepted() {
    let mut raw = RawSettings::default();
    raw.viewer.render_delay_ms = Some(0);
    let settings = ViewerSettings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.viewer.render_delay, Duration::ZERO);
}

#[test]
fn unknown_math_renderer_disables_math() {
    let mut raw = RawSettings::default();
    raw.math.renderer = Some("asciimath".to_string());
    let settings = ViewerSettings::from_raw(raw).expect("unknown renderer is not fatal");
    assert_eq!(settings.math.renderer, None);
}

#[test]
fn math_renderer_name_is_case_insensitive() {
    let mut raw = RawSettings::default();
    raw.math.renderer = Some("MathJax".to_string());
    let settings = ViewerSettings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.math.renderer, Some(MathRenderer::MathJax));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    let err = ViewerSettings::from_raw(raw).expect_err("invalid level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn unknown_highlight_style_is_rejected() {
    let mut raw = RawSettings::default();
    raw.highlight.style = Some("monokai-extended-neon".to_string());
    let err = ViewerSettings::from_raw(raw).expect_err("unknown theme");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "highlight.style",
            ..
        }
    ));
}

#[test]
fn empty_mathjax_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.math.mathjax_url = Some("  ".to_string());
    let err = ViewerSettings::from_raw(raw).expect_err("empty url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "math.mathjax_url",
            ..
        }
    ));
}

#[test]
fn config_file_layer_is_applied() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[viewer]\ndelayed_rendering = false\nrender_delay_ms = 75\n\n[math]\nrenderer = \"mathjax\"\n"
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from(["mdview", "--config-file", &path, "themes"]);
    let settings = load(&args).expect("settings load");

    assert!(!settings.viewer.delayed_rendering);
    assert_eq!(settings.viewer.render_delay, Duration::from_millis(75));
    assert_eq!(settings.math.renderer, Some(MathRenderer::MathJax));
}

#[test]
fn cli_flags_override_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(file, "[viewer]\nrender_delay_ms = 75\n").expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "mdview",
        "--config-file",
        &path,
        "themes",
        "--render-delay-ms",
        "10",
    ]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.viewer.render_delay, Duration::from_millis(10));
}

#[test]
fn missing_config_file_is_an_error() {
    let args = CliArgs::parse_from([
        "mdview",
        "--config-file",
        "/nonexistent/mdview.toml",
        "themes",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from(["mdview", "render", "notes.md", "--output", "out.html"]);

    match args.command {
        Command::Render(render) => {
            assert_eq!(render.input.to_str(), Some("notes.md"));
            assert_eq!(
                render.output.as_deref().and_then(|p| p.to_str()),
                Some("out.html")
            );
            assert!(!render.reads_stdin());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn dash_input_reads_stdin() {
    let args = CliArgs::parse_from(["mdview", "render", "-"]);
    match args.command {
        Command::Render(render) => assert!(render.reads_stdin()),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_watch_arguments() {
    let args = CliArgs::parse_from([
        "mdview",
        "watch",
        "notes.md",
        "--output",
        "out.html",
        "--delayed-rendering",
        "no",
        "--math-renderer",
        "mathjax",
    ]);

    match args.command {
        Command::Watch(watch) => {
            assert_eq!(watch.input.to_str(), Some("notes.md"));
            assert_eq!(watch.output.to_str(), Some("out.html"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(args.overrides.delayed_rendering, Some(false));
    assert_eq!(args.overrides.math_renderer.as_deref(), Some("mathjax"));
}
