use std::path::{Path, PathBuf};
use std::sync::Arc;

use atelier_llm::{
    AspectRatio, GenerationClient, GenerationError, ImageOptions, InputImage, LoadingState, Model,
    ProviderError, authorized_download_url, create_provider, default_gemini_models,
};
use atelier_storage::{
    FileKeyValueStore, HistoryItemId, HistoryStore, KeyValueStore, Language, PreferenceStore,
    StorageError,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use clap::{Parser, Subcommand};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio_util::sync::CancellationToken;

use crate::settings::{AppSettings, SettingsError, SettingsStore};
use crate::workflows::{
    AppBlueprintRequest, CharacterVideoRequest, Creator, ImageToVideoRequest, VideoOutcome,
    ViralVideoRequest, WebsiteRequest, WorkflowError,
};

#[derive(Debug, Parser)]
#[command(name = "atelier")]
#[command(about = "Generate text, images, videos and blueprints with Gemini", long_about = None)]
pub struct Cli {
    /// Settings file to use instead of the platform default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate free text from a prompt
    Text { prompt: String },
    /// Generate one image
    Image {
        prompt: String,
        #[arg(long, default_value = "1:1", value_parser = parse_aspect_ratio)]
        aspect_ratio: AspectRatio,
        /// Write the decoded image here instead of printing a data URI
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a script for an animated character video and render it
    Video {
        idea: String,
        #[arg(long, default_value = "cartoon")]
        style: String,
        #[arg(long, default_value = "30-60 seconds")]
        duration: String,
    },
    /// Animate an existing image
    ImageToVideo {
        image: PathBuf,
        #[arg(long, default_value = "cinematic")]
        style: String,
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Draft a sales website and illustrate its sections
    Website {
        niche: String,
        #[arg(long, default_value = "landing-page")]
        site_type: String,
        /// Directory for the section images
        #[arg(long)]
        images_dir: Option<PathBuf>,
    },
    /// Draft an AI app blueprint
    App {
        idea: String,
        #[arg(long, default_value = atelier_llm::DEFAULT_TEXT_MODEL)]
        model_preference: String,
    },
    /// Render a short video aimed at social platforms
    Viral {
        topic: String,
        #[arg(long, default_value = "TikTok")]
        platform: String,
        #[arg(long, default_value = "user-generated-content")]
        style: String,
    },
    /// List recorded creations, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print the full entry with this id instead of the listing
        #[arg(long)]
        id: Option<HistoryItemId>,
    },
    /// Show or change the interface language
    Language {
        #[arg(value_parser = parse_language)]
        set: Option<Language>,
    },
    /// List the configured and known models
    Models,
    /// Update and save provider settings
    Configure {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display(
        "no API key configured, set GEMINI_API_KEY or run `atelier configure --api-key <KEY>`"
    ))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("no history entry with id {id}"))]
    UnknownHistoryItem {
        stage: &'static str,
        id: HistoryItemId,
    },
    #[snafu(display("failed to create provider on `{stage}`: {source}"))]
    Provider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("storage failed on `{stage}`: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("{source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("{source}"))]
    Generation {
        stage: &'static str,
        source: GenerationError,
    },
    #[snafu(display("{source}"))]
    Workflow {
        stage: &'static str,
        source: WorkflowError,
    },
    #[snafu(display("failed to read image at {path:?}: {source}"))]
    ReadImage {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot tell the image type of {path:?}, use png, jpeg, webp or gif"))]
    UnknownImageType { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to write {path:?}: {source}"))]
    WriteOutput {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("generated image is not a base64 data URI"))]
    MalformedDataUri { stage: &'static str },
    #[snafu(display("generated image has invalid base64 data: {source}"))]
    DecodeDataUri {
        stage: &'static str,
        source: base64::DecodeError,
    },
    #[snafu(display("failed to encode output on `{stage}`: {source}"))]
    EncodeOutput {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

pub async fn run(cli: Cli) -> AppResult<()> {
    let settings_store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = settings_store.settings();

    match cli.command {
        Command::Configure {
            api_key,
            endpoint,
            data_dir,
        } => configure(&settings_store, api_key, endpoint, data_dir),
        Command::Models => {
            list_models(&settings);
            Ok(())
        }
        Command::Language { set } => language(&settings, set),
        Command::History { limit, id } => history(&settings, limit, id),
        command => generate(&settings, command).await,
    }
}

fn configure(
    store: &SettingsStore,
    api_key: Option<String>,
    endpoint: Option<String>,
    data_dir: Option<PathBuf>,
) -> AppResult<()> {
    let mut updated = AppSettings::clone(&store.settings());
    if let Some(api_key) = api_key {
        updated.api_key = api_key;
    }
    if let Some(endpoint) = endpoint {
        updated.endpoint = endpoint;
    }
    if let Some(data_dir) = data_dir {
        updated.data_dir = Some(data_dir);
    }

    store.update(updated).context(SettingsSnafu {
        stage: "configure-save",
    })?;
    println!("saved settings to {}", store.config_path().display());
    Ok(())
}

fn list_models(settings: &AppSettings) {
    let configured = settings.models.to_model_set();
    println!("text:  {}", configured.text);
    println!("image: {}", configured.image);
    println!("video: {}", configured.video);
    println!();
    for model in default_gemini_models() {
        println!("{}", model_line(&model));
    }
}

fn model_line(model: &Model) -> String {
    match &model.description {
        Some(description) => format!("{:<26} {:<18} {}", model.id, model.name, description),
        None => format!("{:<26} {}", model.id, model.name),
    }
}

fn storage_backend(settings: &AppSettings) -> Arc<dyn KeyValueStore> {
    Arc::new(FileKeyValueStore::new(settings.storage_dir()))
}

fn language(settings: &AppSettings, set: Option<Language>) -> AppResult<()> {
    let preferences = PreferenceStore::new(storage_backend(settings));
    if let Some(language) = set {
        preferences.set_language(language).context(StorageSnafu {
            stage: "language-save",
        })?;
    }

    let current = preferences.language().context(StorageSnafu {
        stage: "language-load",
    })?;
    println!("{current}");
    Ok(())
}

fn history(settings: &AppSettings, limit: usize, id: Option<HistoryItemId>) -> AppResult<()> {
    let store = HistoryStore::load(storage_backend(settings)).context(StorageSnafu {
        stage: "history-load",
    })?;

    if let Some(id) = id {
        let item = store.get(id).context(UnknownHistoryItemSnafu {
            stage: "history-show",
            id,
        })?;
        return print_json(&item);
    }

    for item in store.list().into_iter().take(limit) {
        println!("{}  {:<16} {}  {}", item.timestamp, item.kind, item.id, item.title);
    }
    Ok(())
}

async fn generate(settings: &AppSettings, command: Command) -> AppResult<()> {
    let config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "generate-provider-config",
    })?;
    let provider = create_provider(config).context(ProviderSnafu {
        stage: "generate-create-provider",
    })?;
    let history = HistoryStore::load(storage_backend(settings)).context(StorageSnafu {
        stage: "generate-history-load",
    })?;

    let client = GenerationClient::new(provider)
        .with_models(settings.models.to_model_set())
        .with_poll_policy(settings.poll.to_policy());
    let loading_log = tokio::spawn(log_loading_changes(client.loading().clone()));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let creator = Creator::new(client, Arc::new(history)).with_cancellation(cancel);
    let outcome = dispatch(&creator, &settings.api_key, command).await;

    interrupt.abort();
    loading_log.abort();
    outcome
}

async fn dispatch(creator: &Creator, api_key: &str, command: Command) -> AppResult<()> {
    match command {
        Command::Text { prompt } => {
            let text = creator
                .client()
                .generate_text(&prompt)
                .await
                .context(GenerationSnafu { stage: "text" })?;
            println!("{text}");
        }
        Command::Image {
            prompt,
            aspect_ratio,
            out,
        } => {
            let data_uri = creator
                .client()
                .generate_image(&prompt, ImageOptions::with_aspect_ratio(aspect_ratio))
                .await
                .context(GenerationSnafu { stage: "image" })?;
            match out {
                Some(path) => {
                    let written = write_data_uri(&data_uri, &path)?;
                    println!("wrote {}", written.display());
                }
                None => println!("{data_uri}"),
            }
        }
        Command::Video {
            idea,
            style,
            duration,
        } => {
            let created = creator
                .create_character_video(CharacterVideoRequest {
                    idea,
                    style,
                    duration,
                })
                .await
                .context(WorkflowSnafu { stage: "video" })?;
            println!("{}\n", created.script);
            print_video(&created.video, api_key);
        }
        Command::ImageToVideo {
            image,
            style,
            instructions,
        } => {
            let request = ImageToVideoRequest {
                image: read_image(&image)?,
                file_name: image
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                animation_style: style,
                instructions,
            };
            let outcome = creator
                .image_to_video(request)
                .await
                .context(WorkflowSnafu {
                    stage: "image-to-video",
                })?;
            print_video(&outcome, api_key);
        }
        Command::Website {
            niche,
            site_type,
            images_dir,
        } => {
            let created = creator
                .create_website(WebsiteRequest { niche, site_type })
                .await
                .context(WorkflowSnafu { stage: "website" })?;
            print_json(&created.blueprint)?;
            for image in &created.images {
                match &images_dir {
                    Some(directory) => {
                        let path = directory.join(format!("section-{}", image.section_index + 1));
                        let written = write_data_uri(&image.data_uri, &path)?;
                        println!("{}: {}", image.heading, written.display());
                    }
                    None => println!("{}: image ready ({} bytes)", image.heading, image.data_uri.len()),
                }
            }
        }
        Command::App {
            idea,
            model_preference,
        } => {
            let created = creator
                .create_app_blueprint(AppBlueprintRequest {
                    idea,
                    model_preference,
                })
                .await
                .context(WorkflowSnafu { stage: "app" })?;
            print_json(&created.blueprint)?;
        }
        Command::Viral {
            topic,
            platform,
            style,
        } => {
            let outcome = creator
                .create_viral_video(ViralVideoRequest {
                    topic,
                    platform,
                    style,
                })
                .await
                .context(WorkflowSnafu { stage: "viral" })?;
            print_video(&outcome, api_key);
        }
        Command::History { .. } | Command::Language { .. } | Command::Models | Command::Configure { .. } => {
            tracing::debug!("command does not generate content");
        }
    }

    Ok(())
}

fn print_video(outcome: &VideoOutcome, api_key: &str) {
    match &outcome.video_url {
        Some(url) => {
            println!("video: {url}");
            println!("download: {}", authorized_download_url(url, api_key));
        }
        None => println!("the job finished without a video"),
    }
    if outcome.video_url.is_some() && outcome.history_id.is_none() {
        println!("(not saved to history)");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    let encoded = serde_json::to_string_pretty(value).context(EncodeOutputSnafu {
        stage: "print-json",
    })?;
    println!("{encoded}");
    Ok(())
}

async fn log_loading_changes(loading: LoadingState) {
    let mut changes = loading.subscribe();
    while changes.changed().await.is_ok() {
        let snapshot = changes.borrow_and_update().clone();
        tracing::debug!(
            busy = snapshot.busy(),
            in_flight = snapshot.in_flight,
            error = snapshot.error.as_deref().unwrap_or(""),
            "loading state changed"
        );
    }
}

fn parse_aspect_ratio(raw: &str) -> Result<AspectRatio, String> {
    AspectRatio::parse(raw).ok_or_else(|| format!("unsupported aspect ratio '{raw}'"))
}

fn parse_language(raw: &str) -> Result<Language, String> {
    Language::parse(raw).ok_or_else(|| format!("unsupported language '{raw}', use pt or en"))
}

fn image_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn file_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

fn read_image(path: &Path) -> AppResult<InputImage> {
    let mime_type = image_mime_type(path).context(UnknownImageTypeSnafu {
        stage: "read-image-type",
        path: path.to_path_buf(),
    })?;
    let bytes = std::fs::read(path).context(ReadImageSnafu {
        stage: "read-image-bytes",
        path: path.to_path_buf(),
    })?;
    Ok(InputImage::new(bytes, mime_type))
}

/// Splits `data:<mime>;base64,<payload>`.
fn split_data_uri(data_uri: &str) -> Option<(&str, &str)> {
    data_uri.strip_prefix("data:")?.split_once(";base64,")
}

/// Writes the decoded image next to `path` with an extension matching its type.
fn write_data_uri(data_uri: &str, path: &Path) -> AppResult<PathBuf> {
    let (mime_type, payload) = split_data_uri(data_uri).context(MalformedDataUriSnafu {
        stage: "write-image-split",
    })?;
    let bytes = BASE64_STANDARD.decode(payload).context(DecodeDataUriSnafu {
        stage: "write-image-decode",
    })?;

    let path = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(file_extension(mime_type))
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(WriteOutputSnafu {
            stage: "write-image-directory",
            path: parent.to_path_buf(),
        })?;
    }
    std::fs::write(&path, bytes).context(WriteOutputSnafu {
        stage: "write-image-file",
        path: path.clone(),
    })?;
    Ok(path)
}
