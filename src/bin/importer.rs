use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use classic_index::config::{init_tracing, EmbeddingArgs, StoreArgs};
use classic_index::corpus::{load_fragments, DEFAULT_CONTENT_FIELD, DEFAULT_PAGE_FIELD};
use classic_index::import::DEFAULT_BATCH_SIZE;
use classic_index::{preprocess, provision, CollectionSchema, FieldNames, Importer};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "classic-import",
    about = "Embed a book's pages and load them into a fresh Milvus collection"
)]
struct ImportCli {
    /// Book title attached to every imported passage
    #[arg(long, env = "BOOK_NAME", default_value = "马克思全集1")]
    book: String,

    /// Corpus JSON file (defaults to `<book>.json`)
    #[arg(long, env = "CORPUS_PATH")]
    input: Option<PathBuf>,

    /// Passages per embedding request
    #[arg(long, env = "IMPORT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// JSON key holding the page number
    #[arg(long, env = "CORPUS_PAGE_FIELD", default_value = DEFAULT_PAGE_FIELD)]
    page_field: String,

    /// JSON key holding the fragment text
    #[arg(long, env = "CORPUS_CONTENT_FIELD", default_value = DEFAULT_CONTENT_FIELD)]
    content_field: String,

    /// Preprocess and report counts without calling any external service
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    #[command(flatten)]
    store: StoreArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ImportCli::parse();
    init_tracing();

    let input = cli
        .input
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.json", cli.book)));
    anyhow::ensure!(input.exists(), "corpus file {:?} not found", input);
    info!(path = ?input, "loading corpus");

    let fields = FieldNames::new(cli.page_field.clone(), cli.content_field.clone());
    let fragments = load_fragments(&input, &fields)?;
    let passages = preprocess(&fragments, &cli.book);
    info!(
        fragments = fragments.len(),
        passages = passages.len(),
        book = %cli.book,
        "corpus preprocessed"
    );

    if cli.dry_run {
        let collection = cli.store.collection_name()?;
        cli.store.build().context("invalid vector store settings")?;
        info!(collection = %collection, "vector store settings valid; skipping import");
        println!(
            "Dry run: {} fragments merged into {} passages for {}.",
            fragments.len(),
            passages.len(),
            cli.book
        );
        return Ok(());
    }

    let collection = cli.store.collection_name()?;
    let schema = CollectionSchema::new(collection.clone(), cli.embedding.dimension)?;
    let embedder = cli.embedding.build()?;
    anyhow::ensure!(
        cli.batch_size.max(1) <= embedder.max_batch(),
        "batch size {} exceeds the embedding API limit of {}",
        cli.batch_size,
        embedder.max_batch()
    );
    let store = cli
        .store
        .connect()
        .await
        .context("cannot import without a vector store connection")?;

    provision(&store, &schema)
        .await
        .with_context(|| format!("failed to provision collection {collection}"))?;

    let importer = Importer::new(&embedder, &store, &collection, cli.batch_size);
    let progress = ProgressBar::new(passages.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    progress.set_message("importing");

    let result = importer
        .run(&passages, |step| progress.set_position(step.inserted as u64))
        .await;
    match result {
        Ok(inserted) => {
            progress.finish_with_message("imported");
            println!(
                "Successfully imported {} passage{} into {}.",
                inserted,
                if inserted == 1 { "" } else { "s" },
                collection
            );
            Ok(())
        }
        Err(err) => {
            progress.abandon_with_message("failed");
            error!(
                inserted = err.inserted(),
                collection = %collection,
                "import stopped; collection is partially populated"
            );
            Err(err.into())
        }
    }
}
