use std::{path::Path, process, sync::Arc};

use mdview::{
    application::{
        error::AppError,
        render::{ComrakMarkdownEngine, EngineConfig, RenderPipeline, theme_names, theme_stylesheet},
        typeset::{QueuedTypesetter, Typesetter},
    },
    config::{self, Command, RenderArgs, ViewerSettings, WatchArgs},
    domain::{MathRenderer, ViewerSurface},
    infra::{
        document::HostDocument,
        loader::{HttpResourceLoader, ResourceLoader},
        telemetry,
        watch::InputWatcher,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    runtime::Handle,
};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const DEFAULT_TITLE: &str = "mdview";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(settings, args).await,
        Command::Watch(args) => run_watch(settings, args).await,
        Command::Themes => run_themes(&settings).await,
    }
}

/// Everything a command needs to drive one viewer.
struct ViewerContext {
    document: Arc<HostDocument>,
    loader: HttpResourceLoader,
    pipeline: Arc<RenderPipeline>,
    typesetter: Option<Arc<QueuedTypesetter>>,
}

fn build_viewer(
    settings: &ViewerSettings,
    title: &str,
    output: Option<&Path>,
) -> Result<ViewerContext, AppError> {
    let runtime = Handle::current();

    let mut document = HostDocument::new(title);
    if let Some(path) = output {
        document = document.with_output(path);
    }
    let document = Arc::new(document);
    document.inject_style(&theme_stylesheet(&settings.highlight.style)?);

    let loader = HttpResourceLoader::new(Arc::clone(&document), runtime.clone())?;
    let engine = Arc::new(ComrakMarkdownEngine::new(&EngineConfig::from(settings)));

    let mut pipeline = RenderPipeline::new(
        engine,
        settings.viewer.delayed_rendering,
        settings.viewer.render_delay,
        runtime.clone(),
    );

    let typesetter = match settings.math.renderer {
        Some(renderer) if renderer.is_deferred() => {
            let typesetter = Arc::new(QueuedTypesetter::spawn(&runtime));
            pipeline = pipeline.with_typesetter(Arc::clone(&typesetter) as Arc<dyn Typesetter>);
            Some(typesetter)
        }
        _ => None,
    };

    info!(
        target = "mdview",
        math = settings.math.renderer.map_or("none", MathRenderer::as_str),
        highlight = %settings.highlight.style,
        delayed = settings.viewer.delayed_rendering,
        delay_ms = settings.viewer.render_delay.as_millis() as u64,
        "Viewer configured"
    );

    Ok(ViewerContext {
        document,
        loader,
        pipeline: Arc::new(pipeline),
        typesetter,
    })
}

async fn run_render(settings: ViewerSettings, args: RenderArgs) -> Result<(), AppError> {
    let markdown = if args.reads_stdin() {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        tokio::fs::read_to_string(&args.input).await?
    };

    let title = document_title(&args.input);
    let context = build_viewer(&settings, &title, args.output.as_deref())?;

    // A one-shot render waits for its assets so the output is complete.
    match settings.math.renderer {
        Some(MathRenderer::Katex) => {
            if let Err(err) = context
                .loader
                .fetch_style(&settings.math.katex_stylesheet_url)
                .await
            {
                warn!(target = "mdview", error = %err, "KaTeX stylesheet unavailable");
            }
        }
        Some(MathRenderer::MathJax) => {
            match context.loader.fetch_script(&settings.math.mathjax_url).await {
                Ok(()) => {
                    if let Some(typesetter) = context.typesetter.as_ref() {
                        typesetter.readiness().mark_ready();
                    }
                }
                Err(err) => {
                    warn!(target = "mdview", error = %err, "MathJax script unavailable");
                }
            }
        }
        None => {}
    }

    let viewer = context
        .pipeline
        .attach(Arc::clone(&context.document) as Arc<dyn ViewerSurface>);
    viewer.render_now(Some(&markdown), None);

    if let Some(typesetter) = context.typesetter.as_ref() {
        typesetter.flush().await;
    }

    match context.document.output() {
        Some(path) => {
            context.document.persist();
            info!(target = "mdview", path = %path.display(), "Rendered document");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(context.document.content().as_bytes())
                .await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

async fn run_watch(settings: ViewerSettings, args: WatchArgs) -> Result<(), AppError> {
    if args.input.as_os_str() == "-" {
        return Err(AppError::validation("watch needs a file path, not standard input"));
    }

    let title = document_title(&args.input);
    let context = build_viewer(&settings, &title, Some(&args.output))?;

    match settings.math.renderer {
        Some(MathRenderer::Katex) => context.loader.load_style(&settings.math.katex_stylesheet_url),
        Some(MathRenderer::MathJax) => {
            if let Some(typesetter) = context.typesetter.as_ref() {
                typesetter.load(&context.loader, &settings.math.mathjax_url);
            }
        }
        None => {}
    }

    let viewer = context
        .pipeline
        .attach(Arc::clone(&context.document) as Arc<dyn ViewerSurface>);

    let mut watcher = InputWatcher::new(&args.input)?;
    let markdown = tokio::fs::read_to_string(&args.input).await?;
    viewer.render_now(Some(&markdown), None);
    info!(
        target = "mdview",
        input = %args.input.display(),
        output = %args.output.display(),
        "Watching for changes"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = watcher.changed() => {
                if change.is_none() {
                    warn!(target = "mdview", "File watcher stopped");
                    break;
                }
            }
            _ = &mut shutdown => {
                info!(target = "mdview", "Stopping watcher");
                break;
            }
        }

        match tokio::fs::read_to_string(&args.input).await {
            Ok(markdown) => {
                let input = args.input.clone();
                viewer.render(
                    Some(&markdown),
                    Some(Box::new(move || {
                        debug!(
                            target = "mdview",
                            input = %input.display(),
                            "Render complete"
                        );
                    })),
                );
            }
            Err(err) => warn!(target = "mdview", error = %err, "Cannot read input"),
        }
    }

    Ok(())
}

async fn run_themes(settings: &ViewerSettings) -> Result<(), AppError> {
    let mut listing = String::new();
    for name in theme_names() {
        let marker = if name == settings.highlight.style {
            " (configured)"
        } else {
            ""
        };
        listing.push_str(name);
        listing.push_str(marker);
        listing.push('\n');
    }

    let mut stdout = tokio::io::stdout();
    stdout.write_all(listing.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

fn document_title(input: &Path) -> String {
    input
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| *name != "-")
        .map_or_else(|| DEFAULT_TITLE.to_string(), str::to_string)
}
