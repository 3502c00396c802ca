//! kgtrain CLI - train and evaluate knowledge graph embeddings.
//!
//! # Usage
//!
//! ```bash
//! # Dataset summary (train2id.txt, valid2id.txt, test2id.txt, ...)
//! kgtrain stats benchmarks/FB15K
//!
//! # Train TransE and export the parameters
//! kgtrain train benchmarks/FB15K --epochs 1000 --bern -o transe.json
//!
//! # Link prediction and triple classification on the test split
//! kgtrain test benchmarks/FB15K -p transe.json
//!
//! # Only the protocols enabled in the config's [evaluation] section
//! kgtrain test benchmarks/FB15K -p transe.json --config run.toml
//!
//! # Top-10 tails for (head 3, relation 0)
//! kgtrain predict-tail benchmarks/FB15K -p transe.json --head 3 --relation 0
//!
//! # Is (3, 7, 0) true?
//! kgtrain classify benchmarks/FB15K -p transe.json --head 3 --tail 7 --relation 0
//! ```
//!
//! Logging goes to stderr; raise it with `-v`/`-vv` or `RUST_LOG`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kgtrain::evaluation::{self, Prediction};
use kgtrain::{
    classification, BiasMode, GraphStore, KgConfig, OptimizerKind, ParameterStore,
    SelectionPolicy, Split, Trainer, TransE, Triple,
};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "kgtrain")]
#[command(about = "Knowledge graph embedding trainer and evaluator", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show statistics about a dataset directory
    Stats {
        /// Dataset directory
        data: PathBuf,

        /// Also print per-relation degree statistics
        #[arg(long)]
        relations: bool,
    },

    /// Train TransE on the training split
    Train(TrainArgs),

    /// Run link prediction and triple classification on the test split
    Test {
        #[command(flatten)]
        model: ModelArgs,

        /// TOML configuration whose [evaluation] section picks the protocols
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only run link prediction
        #[arg(long, conflicts_with = "classification_only")]
        link_only: bool,

        /// Only run triple classification
        #[arg(long)]
        classification_only: bool,

        /// Seed for classification negatives
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Most plausible heads for (?, tail, relation)
    PredictHead {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        tail: u32,

        #[arg(long, short)]
        relation: u32,

        /// Number of candidates
        #[arg(short, default_value = "10")]
        k: usize,
    },

    /// Most plausible tails for (head, ?, relation)
    PredictTail {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        head: u32,

        #[arg(long, short)]
        relation: u32,

        /// Number of candidates
        #[arg(short, default_value = "10")]
        k: usize,
    },

    /// Most plausible relations for (head, tail, ?)
    PredictRelation {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        head: u32,

        #[arg(long)]
        tail: u32,

        /// Number of candidates
        #[arg(short, default_value = "10")]
        k: usize,
    },

    /// Classify a single triple as true or false
    Classify {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        head: u32,

        #[arg(long)]
        tail: u32,

        #[arg(long, short)]
        relation: u32,

        /// Explicit threshold; fitted on the validation split when omitted
        #[arg(long)]
        threshold: Option<f32>,

        /// Seed for validation negatives
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Dataset directory
    data: PathBuf,

    /// Exported parameter file
    #[arg(short, long)]
    params: PathBuf,
}

#[derive(Args)]
struct TrainArgs {
    /// Dataset directory (overrides data.in_path from --config)
    data: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter file written at the end (and every --export-steps epochs)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    nbatches: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    dim: Option<usize>,

    #[arg(long)]
    margin: Option<f32>,

    /// Learning rate
    #[arg(long)]
    alpha: Option<f32>,

    #[arg(long)]
    opt: Option<OptArg>,

    /// Entity corruptions per positive
    #[arg(long)]
    neg_ent: Option<usize>,

    /// Relation corruptions per positive
    #[arg(long)]
    neg_rel: Option<usize>,

    /// Sampling worker threads
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Use the bern head/tail corruption bias
    #[arg(long)]
    bern: bool,

    /// Walk the training split in shuffled epochs instead of drawing uniformly
    #[arg(long)]
    shuffle: bool,

    #[arg(long)]
    export_steps: Option<usize>,

    /// Start from a previously exported parameter file
    #[arg(long)]
    import: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptArg {
    Sgd,
    Adagrad,
}

impl From<OptArg> for OptimizerKind {
    fn from(arg: OptArg) -> Self {
        match arg {
            OptArg::Sgd => OptimizerKind::Sgd,
            OptArg::Adagrad => OptimizerKind::Adagrad,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Stats { data, relations } => cmd_stats(&data, relations),
        Commands::Train(args) => cmd_train(args),
        Commands::Test {
            model,
            config,
            link_only,
            classification_only,
            seed,
            json,
        } => {
            let (link, classify) =
                test_selection(config.as_deref(), link_only, classification_only)?;
            cmd_test(&model, link, classify, seed, json)
        }
        Commands::PredictHead {
            model,
            tail,
            relation,
            k,
        } => {
            let (store, transe) = load_model(&model)?;
            let top = evaluation::predict_head(&store, &transe, tail, relation, k)?;
            print_predictions(&format!("heads for (?, {tail}, {relation})"), &top);
            Ok(())
        }
        Commands::PredictTail {
            model,
            head,
            relation,
            k,
        } => {
            let (store, transe) = load_model(&model)?;
            let top = evaluation::predict_tail(&store, &transe, head, relation, k)?;
            print_predictions(&format!("tails for ({head}, ?, {relation})"), &top);
            Ok(())
        }
        Commands::PredictRelation {
            model,
            head,
            tail,
            k,
        } => {
            let (store, transe) = load_model(&model)?;
            let top = evaluation::predict_relation(&store, &transe, head, tail, k)?;
            print_predictions(&format!("relations for ({head}, {tail}, ?)"), &top);
            Ok(())
        }
        Commands::Classify {
            model,
            head,
            tail,
            relation,
            threshold,
            seed,
        } => cmd_classify(&model, Triple::new(head, tail, relation), threshold, seed),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_store(dir: &Path) -> Result<GraphStore> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", dir.display()));

    let store = GraphStore::from_dir(dir)
        .with_context(|| format!("Failed to load dataset {}", dir.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(store)
}

fn load_model(args: &ModelArgs) -> Result<(GraphStore, TransE)> {
    let store = load_store(&args.data)?;
    let params = ParameterStore::load(&args.params)
        .with_context(|| format!("Failed to read parameters {}", args.params.display()))?;
    let model = TransE::from_parameters(&params)
        .with_context(|| format!("Invalid parameters in {}", args.params.display()))?;
    if model.entity_count() != store.entity_count() || model.relation_count() != store.relation_count() {
        bail!(
            "{} holds {} entities / {} relations, dataset has {} / {}",
            args.params.display(),
            model.entity_count(),
            model.relation_count(),
            store.entity_count(),
            store.relation_count()
        );
    }
    Ok((store, model))
}

fn cmd_stats(data: &Path, relations: bool) -> Result<()> {
    let store = load_store(data)?;
    let stats = store.stats();

    println!("Dataset Statistics");
    println!("==================");
    println!("Entities:       {}", stats.entity_count);
    println!("Relations:      {}", stats.relation_count);
    println!("Train triples:  {}", stats.train_count);
    println!("Valid triples:  {}", stats.valid_count);
    println!("Test triples:   {}", stats.test_count);
    println!(
        "Type constraints: {}",
        if stats.has_type_constraints { "yes" } else { "no" }
    );

    if relations {
        println!();
        println!("{:>8} {:>8} {:>8} {:>8} {:>10}", "relation", "triples", "tph", "hpt", "tail bias");
        for r in 0..stats.relation_count as u32 {
            if let Some(rs) = store.relation_stats(r) {
                println!(
                    "{:>8} {:>8} {:>8.2} {:>8.2} {:>10.3}",
                    r,
                    rs.triples,
                    rs.tails_per_head(),
                    rs.heads_per_tail(),
                    rs.tail_bias()
                );
            }
        }
    }
    Ok(())
}

fn train_config(args: &TrainArgs) -> Result<KgConfig> {
    let mut config = match &args.config {
        Some(path) => KgConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => KgConfig::default(),
    };
    if let Some(data) = &args.data {
        config = config.with_in_path(data);
    } else if args.config.is_none() {
        bail!("either a dataset directory or --config is required");
    }
    if let Some(v) = args.epochs {
        config = config.with_train_times(v);
    }
    if let Some(v) = args.nbatches {
        config = config.with_nbatches(v);
    }
    if let Some(v) = args.batch_size {
        config = config.with_batch_size(v);
    }
    if let Some(v) = args.dim {
        config = config.with_dimension(v);
    }
    if let Some(v) = args.margin {
        config = config.with_margin(v);
    }
    if let Some(v) = args.alpha {
        config = config.with_alpha(v);
    }
    if let Some(v) = args.opt {
        config = config.with_opt_method(v.into());
    }
    if let Some(v) = args.neg_ent {
        config = config.with_ent_neg_rate(v);
    }
    if let Some(v) = args.neg_rel {
        config = config.with_rel_neg_rate(v);
    }
    if let Some(v) = args.threads {
        config = config.with_work_threads(v);
    }
    if let Some(v) = args.seed {
        config = config.with_seed(v);
    }
    if args.bern {
        config = config.with_bias(BiasMode::Bern);
    }
    if args.shuffle {
        config = config.with_selection(SelectionPolicy::Shuffled);
    }
    if let Some(v) = args.export_steps {
        config = config.with_export_steps(v);
    }
    if let Some(path) = &args.output {
        config = config.with_export_path(path);
    }
    if let Some(path) = &args.import {
        config = config.with_import_path(path);
    }
    config.validate()?;
    Ok(config)
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = train_config(&args)?;
    let store = load_store(&config.data.in_path)?;

    let mut trainer = Trainer::new(&store, &config).context("Failed to set up training")?;
    info!(
        epochs = trainer.epochs(),
        batches = trainer.batches_per_epoch(),
        dim = config.training.dimension,
        "training"
    );

    let start = Instant::now();
    let pb = ProgressBar::new(trainer.epochs() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let summary = trainer.run(&store, |epoch| {
        pb.set_message(format!("loss {:.4}", epoch.loss));
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    println!("Trained {} epochs in {:.2?}", summary.epochs.len(), start.elapsed());
    if let Some(loss) = summary.final_loss() {
        println!("Final loss:     {loss:.4}");
    }
    if summary.sampling_fallbacks > 0 {
        println!("Sampling fallbacks: {}", summary.sampling_fallbacks);
    }
    if let Some(path) = &config.training.export_path {
        println!("Parameters:     {}", path.display());
    }
    Ok(())
}

/// Protocols to run: the config's [evaluation] flags (both without a config),
/// overridden by --link-only / --classification-only.
fn test_selection(
    config: Option<&Path>,
    link_only: bool,
    classification_only: bool,
) -> Result<(bool, bool)> {
    if link_only {
        return Ok((true, false));
    }
    if classification_only {
        return Ok((false, true));
    }
    let Some(path) = config else {
        return Ok((true, true));
    };
    let config = KgConfig::from_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    let selection = (
        config.evaluation.link_prediction,
        config.evaluation.triple_classification,
    );
    if selection == (false, false) {
        bail!(
            "{} enables neither evaluation.link_prediction nor evaluation.triple_classification",
            path.display()
        );
    }
    Ok(selection)
}

fn cmd_test(model: &ModelArgs, link: bool, classify: bool, seed: u64, json: bool) -> Result<()> {
    let (store, transe) = load_model(model)?;
    let mut out = serde_json::Map::new();

    if link {
        let start = Instant::now();
        let report = evaluation::evaluate(&store, Split::Test, &transe)
            .context("Link prediction failed")?;
        if json {
            out.insert("link_prediction".into(), serde_json::to_value(report)?);
        } else {
            println!("Link prediction ({:.2?})", start.elapsed());
            println!("{}", report.summary());
        }
    }

    if classify {
        let (_, report) =
            classification::run(&store, &transe, seed).context("Triple classification failed")?;
        if json {
            out.insert("triple_classification".into(), serde_json::to_value(report)?);
        } else {
            println!("Triple classification");
            println!("{}", report.summary());
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}

fn cmd_classify(model: &ModelArgs, triple: Triple, threshold: Option<f32>, seed: u64) -> Result<()> {
    let (store, transe) = load_model(model)?;
    if triple.head as usize >= store.entity_count()
        || triple.tail as usize >= store.entity_count()
        || triple.relation as usize >= store.relation_count()
    {
        bail!("{triple} is outside the dataset's id range");
    }

    let table = match threshold {
        Some(_) => None,
        None => {
            let valid = classification::ClassificationSet::build(&store, Split::Valid, seed)
                .context("Cannot fit thresholds")?;
            let (pos, neg) = valid.score(&transe);
            Some(classification::fit_thresholds(
                store.relation_count(),
                &valid.positives,
                &pos,
                &valid.negatives,
                &neg,
            )?)
        }
    };
    let verdict = classification::predict_triple(&transe, triple, table.as_ref(), threshold)?;
    println!("{triple}: {}", if verdict { "true" } else { "false" });
    Ok(())
}

fn print_predictions(title: &str, predictions: &[Prediction]) {
    println!("Top {} {title}:", predictions.len());
    for (rank, p) in predictions.iter().enumerate() {
        println!("  {:>3}. {:>8}  {:.4}", rank + 1, p.id, p.score);
    }
}
