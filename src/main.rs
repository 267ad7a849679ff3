use clap::{Args, Parser, Subcommand};
use faso_media::config;
use faso_media::display::{DisplayContext, NetworkClass, resolve};
use faso_media::imaging::RustBackend;
use faso_media::output;
use faso_media::record::{self, AttachMode, FieldKind, ImageField};
use faso_media::storage::{
    JsonRecordStore, LocalObjectStore, MemoryObjectStore, MemoryRecordStore, ObjectStore,
    RecordStore,
};
use faso_media::upload::{self, CancelToken, UploadEvent, UploadFile, UploadOptions};
use faso_media::variant::ImageRef;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "faso-media")]
#[command(about = "Image variant pipeline for marketplace listings and profiles")]
#[command(long_about = "\
Image variant pipeline for marketplace listings and profiles

Each uploaded photo is stored as up to four renditions sharing one base name:

  listings/1718035200123-9f2c4e1ab0-thumbnail.webp   200x200 box
  listings/1718035200123-9f2c4e1ab0-medium.webp      800x600 box
  listings/1718035200123-9f2c4e1ab0-large.webp       1600x1200 box
  listings/1718035200123-9f2c4e1ab0-original.webp    2400x2400 box

Renditions are fit inside their box, never cropped or upscaled. Records hold
either a legacy URL string or an object with one URL per rendition; display
surfaces resolve that to one URL per context (thumbnail, card, detail, hero).

Logging goes to stderr and is controlled by RUST_LOG (default: warn).

Run 'faso-media gen-config' to generate a documented faso-media.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "faso-media.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// A record field holding image references.
#[derive(Args, Clone)]
struct FieldArgs {
    /// Table name, e.g. listings or profiles
    table: String,
    /// Record id
    id: String,
    /// Field name, e.g. images or avatar_url
    field: String,
    /// The field holds one reference instead of a list
    #[arg(long)]
    single: bool,
}

impl FieldArgs {
    fn image_field(&self) -> ImageField {
        let kind = if self.single {
            FieldKind::Single
        } else {
            FieldKind::List
        };
        ImageField::new(&self.table, &self.id, &self.field, kind)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Generate and store variants for image files
    Upload {
        /// Image files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Override the configured bucket
        #[arg(long)]
        bucket: Option<String>,
        /// Override the configured folder prefix
        #[arg(long)]
        folder: Option<String>,
        /// Append the uploaded images to listings.images of this listing
        #[arg(long, conflicts_with = "avatar")]
        listing: Option<String>,
        /// Set profiles.avatar_url of this profile (single file only)
        #[arg(long)]
        avatar: Option<String>,
        /// Process everything but keep results in memory
        #[arg(long)]
        dry_run: bool,
        /// Print batch progress percentages
        #[arg(long)]
        progress: bool,
        /// Print the resulting image references as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which URL each display context would render
    Resolve {
        /// Image reference: a JSON variant object or a plain URL
        reference: String,
        /// Only this context (thumbnail, card, detail, hero)
        #[arg(long)]
        context: Option<DisplayContext>,
        /// Resolve for a slow or metered connection
        #[arg(long)]
        constrained: bool,
    },
    /// Write image references to a record, removing replaced objects
    Attach {
        #[command(flatten)]
        field: FieldArgs,
        /// References: JSON variant objects or plain URLs
        #[arg(required = true)]
        references: Vec<String>,
        /// Keep existing references and add these after them
        #[arg(long)]
        append: bool,
    },
    /// Clear a record field and remove its objects
    Remove {
        #[command(flatten)]
        field: FieldArgs,
        /// Delete the whole record after removing its objects
        #[arg(long)]
        delete_record: bool,
    },
    /// Remove stored objects no record references
    Sweep {
        /// Only consider objects under this prefix
        #[arg(long, default_value = "")]
        prefix: String,
        /// Referencing columns as table.field
        #[arg(long = "field", default_values = ["listings.images", "profiles.avatar_url"])]
        fields: Vec<String>,
        /// Report orphans without removing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a stock faso-media.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    if matches!(cli.command, Command::GenConfig) {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    let objects = LocalObjectStore::new(&config.storage.root, &config.storage.public_base_url);
    let records = JsonRecordStore::new(&config.storage.records_dir);

    match cli.command {
        Command::Upload {
            files,
            bucket,
            folder,
            listing,
            avatar,
            dry_run,
            progress,
            json,
        } => {
            init_thread_pool(&config.processing);
            let mut options = UploadOptions::from_config(&config);
            if let Some(bucket) = bucket {
                options.bucket = bucket;
            }
            if let Some(folder) = folder {
                options.folder = folder;
            }
            let target = match (listing, avatar) {
                (Some(id), _) => Some((ImageField::listing(&id), AttachMode::Append)),
                (_, Some(id)) => Some((ImageField::avatar(&id), AttachMode::Replace)),
                _ => None,
            };
            if target
                .as_ref()
                .is_some_and(|(f, _)| f.kind == FieldKind::Single)
                && files.len() != 1
            {
                return Err("--avatar takes exactly one file".into());
            }

            let files = files
                .iter()
                .map(|p| UploadFile::from_path(p))
                .collect::<Result<Vec<_>, _>>()?;
            let job = UploadJob {
                files,
                options,
                target,
                progress,
                json,
            };
            if dry_run {
                job.run(&MemoryObjectStore::new(), &MemoryRecordStore::new())?;
            } else {
                job.run(&objects, &records)?;
            }
        }
        Command::Resolve {
            reference,
            context,
            constrained,
        } => {
            let image = parse_reference(&reference);
            let network = if constrained {
                NetworkClass::Constrained
            } else {
                NetworkClass::Normal
            };
            let contexts = match context {
                Some(c) => vec![c],
                None => DisplayContext::ALL.to_vec(),
            };
            for context in contexts {
                let resolved = resolve(
                    image.as_ref(),
                    context,
                    network,
                    &config.display.placeholder,
                );
                println!("{}", output::format_resolved(context, &resolved));
            }
        }
        Command::Attach {
            field,
            references,
            append,
        } => {
            let refs: Vec<ImageRef> = references
                .iter()
                .filter_map(|r| parse_reference(r))
                .collect();
            let mode = if append {
                AttachMode::Append
            } else {
                AttachMode::Replace
            };
            let image_field = field.image_field();
            let outcome = record::attach_images(
                &records,
                &objects,
                &config.upload.bucket,
                &image_field,
                refs,
                mode,
            )?;
            output::print_attach_outcome(&outcome, &field.table, &field.id);
        }
        Command::Remove {
            field,
            delete_record,
        } => {
            let removed = if delete_record {
                record::delete_record(
                    &records,
                    &objects,
                    &config.upload.bucket,
                    &field.table,
                    &field.id,
                    &[field.field.as_str()],
                )?
            } else {
                record::remove_images(
                    &records,
                    &objects,
                    &config.upload.bucket,
                    &field.image_field(),
                )?
            };
            for line in output::format_removed(&removed) {
                println!("{}", line);
            }
        }
        Command::Sweep {
            prefix,
            fields,
            dry_run,
        } => {
            let columns = fields
                .iter()
                .map(|f| {
                    f.split_once('.')
                        .ok_or_else(|| format!("--field must be table.field, got '{f}'"))
                })
                .collect::<Result<Vec<(&str, &str)>, _>>()?;
            let report = record::sweep_orphans(
                &records,
                &objects,
                &config.upload.bucket,
                &prefix,
                &columns,
                dry_run,
            )?;
            output::print_sweep_report(&report, dry_run);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

struct UploadJob {
    files: Vec<UploadFile>,
    options: UploadOptions,
    target: Option<(ImageField, AttachMode)>,
    progress: bool,
    json: bool,
}

impl UploadJob {
    fn run(
        self,
        objects: &impl ObjectStore,
        records: &impl RecordStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let backend = RustBackend::new();
        let cancel = CancelToken::new();
        let show_progress = self.progress;

        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                if let UploadEvent::Progress { percent } = event {
                    if show_progress {
                        println!("{}", output::format_progress(percent));
                    }
                    continue;
                }
                for line in output::format_upload_event(&event) {
                    println!("{}", line);
                }
            }
        });
        let report = upload::upload_images(
            &backend,
            objects,
            &self.files,
            &self.options,
            Some(&tx),
            &cancel,
        );
        drop(tx);
        printer
            .join()
            .map_err(|_| "output thread panicked")?;

        output::print_upload_report(&report);

        if let Some((field, mode)) = &self.target
            && !report.uploaded.is_empty()
        {
            let outcome = record::attach_images(
                records,
                objects,
                &self.options.bucket,
                field,
                report.image_refs(),
                *mode,
            )?;
            output::print_attach_outcome(&outcome, &field.table, &field.id);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report.image_refs())?);
        }
        if report.uploaded.is_empty() {
            return Err("no file was uploaded".into());
        }
        Ok(())
    }
}

/// A JSON image reference, or a plain URL taken as a legacy reference.
fn parse_reference(raw: &str) -> Option<ImageRef> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str::<ImageRef>(trimmed)
        .ok()
        .or_else(|| Some(ImageRef::Legacy(trimmed.to_string())))
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can lower the count, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
