use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use arbor_io::{
    ClassMetricsEntry, CsvRecordReader, CvSummary, ExperimentName, FoldEntry, ImportanceEntry,
    ResultWriter, RunSummary, TreeNodeEntry,
};
use arbor_tree::{
    ConfusionMatrix, CrossValidation, DecisionTree, Holdout, ImportanceTable, MaxDepth,
    PruningConfig, PruningStrategy, RecordParser, RunRequest, Session, SplitCriterion, TieBreak,
    ZeroDepth,
};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Decision tree induction, pruning, evaluation and cross-validation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel folds (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Where records come from and how they are named.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Attribute to predict
    #[arg(long)]
    target: String,

    /// Column whose value becomes the record id (defaults to the row number)
    #[arg(long)]
    id_column: Option<String>,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

/// Tree growth and pruning parameters.
#[derive(Args, Debug, Clone)]
struct TreeArgs {
    /// Split criterion: "InfoGain", "GiniIndex" or "GainRatio"
    #[arg(long, default_value = "InfoGain")]
    criterion: String,

    /// Maximum depth: a non-negative integer or "unlimited"
    #[arg(long, default_value = "unlimited")]
    max_depth: String,

    /// Read a max depth of 0 as "no bound" instead of "root leaf only"
    #[arg(long, default_value_t = false)]
    zero_depth_unlimited: bool,

    /// Majority tie-break: "lexicographic" or "first-seen"
    #[arg(long, default_value = "lexicographic")]
    tie_break: String,

    /// Prune the grown tree
    #[arg(long, default_value_t = false)]
    prune: bool,

    /// Pruning strategy: "reduced-error" or "cost-complexity"
    #[arg(long, default_value = "reduced-error")]
    prune_strategy: String,

    /// Penalty per extra leaf for cost-complexity pruning
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,

    /// Reduced-error hold-out: "tail" (end of the training set) or "test"
    #[arg(long, default_value = "tail")]
    holdout: String,

    /// Share of the training records held out by the "tail" hold-out
    #[arg(long, default_value_t = 0.25)]
    holdout_fraction: f64,

    /// Abort tree growth after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Build a tree on a training set and evaluate it on a test set
    Run {
        /// Training CSV, or the whole dataset when --train-ratio is given
        #[arg(long)]
        train: PathBuf,

        /// Test CSV
        #[arg(long, conflicts_with = "train_ratio", required_unless_present = "train_ratio")]
        test: Option<PathBuf>,

        /// Use the first share of --train for training and the rest for testing
        #[arg(long)]
        train_ratio: Option<f64>,

        /// Also save the tree as `{experiment}_model.bin`
        #[arg(long, default_value_t = false)]
        save_model: bool,

        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Estimate accuracy with contiguous k-fold cross-validation
    CrossValidate {
        /// Path to the input CSV file
        #[arg(long)]
        input: PathBuf,

        /// Number of folds
        #[arg(long, default_value_t = 10)]
        folds: usize,

        /// Shuffle records with this seed before blocking them into folds
        #[arg(long)]
        shuffle_seed: Option<u64>,

        /// Evaluate folds on the thread pool
        #[arg(long, default_value_t = false)]
        parallel: bool,

        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Rank attributes by cumulative split gain
    Importance {
        /// Path to the training CSV file
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Export a tree as a node/edge JSON list
    Export {
        /// Training CSV to build the tree from
        #[arg(long, conflicts_with = "model", required_unless_present = "model")]
        input: Option<PathBuf>,

        /// Previously saved model to export instead of building one
        #[arg(long)]
        model: Option<PathBuf>,

        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        tree: TreeArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct RunOutput<'a> {
    experiment: &'a str,
    n_train: usize,
    n_test: usize,
    n_nodes: usize,
    pruned_nodes: usize,
    accuracy: f64,
    mcc: f64,
    fallbacks: usize,
    artifacts: Vec<String>,
}

#[derive(Serialize)]
struct CvOutput<'a> {
    experiment: &'a str,
    n_records: usize,
    n_folds: usize,
    mean_accuracy: f64,
    std_accuracy: f64,
    mean_mcc: f64,
    artifacts: Vec<String>,
}

#[derive(Serialize)]
struct ImportanceOutput<'a> {
    experiment: &'a str,
    n_train: usize,
    features: &'a [ImportanceEntry],
    artifacts: Vec<String>,
}

#[derive(Serialize)]
struct ExportOutput<'a> {
    experiment: &'a str,
    n_nodes: usize,
    n_leaves: usize,
    depth: usize,
    artifacts: Vec<String>,
}

fn parse_pruning(args: &TreeArgs) -> Result<Option<PruningConfig>> {
    if !args.prune {
        return Ok(None);
    }
    let strategy = match args.prune_strategy.as_str() {
        "reduced-error" => PruningStrategy::ReducedError,
        "cost-complexity" => PruningStrategy::CostComplexity { alpha: args.alpha },
        other => anyhow::bail!(
            "unknown pruning strategy: {other} (expected reduced-error or cost-complexity)"
        ),
    };
    let holdout = match args.holdout.as_str() {
        "tail" => Holdout::TrainingTail {
            fraction: args.holdout_fraction,
        },
        "test" => Holdout::TestSet,
        other => anyhow::bail!("unknown hold-out: {other} (expected tail or test)"),
    };
    let config = PruningConfig::new()
        .with_strategy(strategy)
        .with_holdout(holdout);
    config.validate().context("invalid pruning settings")?;
    Ok(Some(config))
}

fn build_request(data: &DataArgs, args: &TreeArgs) -> Result<RunRequest> {
    let criterion: SplitCriterion = args.criterion.parse().context("invalid --criterion")?;
    let zero = if args.zero_depth_unlimited {
        ZeroDepth::Unlimited
    } else {
        ZeroDepth::RootOnly
    };
    let max_depth = MaxDepth::from_legacy(&args.max_depth, zero).context("invalid --max-depth")?;
    let tie_break: TieBreak = args.tie_break.parse().context("invalid --tie-break")?;

    Ok(RunRequest::new(data.target.clone())
        .with_criterion(criterion)
        .with_max_depth(max_depth)
        .with_tie_break(tie_break)
        .with_pruning(parse_pruning(args)?)
        .with_deadline(args.deadline_ms.map(Duration::from_millis)))
}

fn record_parser(data: &DataArgs) -> RecordParser {
    let parser = RecordParser::new().with_target(data.target.clone());
    match &data.id_column {
        Some(column) => parser.with_id_attribute(column.clone()),
        None => parser,
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    CsvRecordReader::new(path)
        .read()
        .with_context(|| format!("failed to read {}", path.display()))
}

fn open_writer(data: &DataArgs) -> Result<ResultWriter> {
    let experiment = ExperimentName::new(data.experiment.clone())?;
    Ok(ResultWriter::new(&data.output_dir, experiment)?)
}

fn confusion_parts(cm: &ConfusionMatrix) -> (Vec<String>, Vec<Vec<usize>>) {
    (cm.labels().to_vec(), cm.as_rows().to_vec())
}

fn importance_rows(table: &ImportanceTable) -> Vec<ImportanceEntry> {
    table
        .rows()
        .iter()
        .map(|r| ImportanceEntry {
            rank: r.rank,
            attribute: r.attribute.clone(),
            cumulative_gain: r.cumulative_gain,
            share: r.share,
            n_splits: r.n_splits,
        })
        .collect()
}

fn tree_nodes(tree: &DecisionTree) -> Vec<TreeNodeEntry> {
    tree.views()
        .into_iter()
        .map(|v| TreeNodeEntry {
            id: v.id.index(),
            parent: v.parent.map(|p| p.index()),
            label: v.label,
            predicate: v.predicate,
            depth: v.depth,
            is_leaf: v.is_leaf,
            class: v.class,
            n_samples: v.n_samples,
        })
        .collect()
}

fn pruning_label(request: &RunRequest) -> Option<String> {
    request.config().pruning().map(|p| match p.strategy() {
        PruningStrategy::ReducedError => "reduced-error".to_string(),
        PruningStrategy::CostComplexity { alpha } => format!("cost-complexity(alpha={alpha})"),
    })
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Run {
            train,
            test,
            train_ratio,
            save_model,
            data,
            tree,
        } => {
            let request = build_request(&data, &tree)?;
            let writer = open_writer(&data)?;
            let mut session = Session::new(record_parser(&data));

            match (test, train_ratio) {
                (Some(test), _) => {
                    session
                        .load_train(read_lines(&train)?)
                        .context("failed to parse training records")?;
                    session
                        .load_test(read_lines(&test)?)
                        .context("failed to parse test records")?;
                }
                (None, Some(ratio)) => {
                    session
                        .load_pooled(read_lines(&train)?)
                        .context("failed to parse records")?;
                    let (n_train, n_test) = session.auto_split(ratio)?;
                    info!(n_train, n_test, "records split");
                }
                (None, None) => anyhow::bail!("either --test or --train-ratio is required"),
            }

            let report = session
                .run(&request)
                .context("run failed")?
                .ready()
                .context("no records loaded")?;
            let evaluation = &report.evaluation;
            let (labels, confusion_matrix) = confusion_parts(evaluation.confusion());

            let summary = RunSummary {
                target: data.target.clone(),
                criterion: request.config().criterion().to_string(),
                max_depth: request.config().max_depth().to_string(),
                pruning: pruning_label(&request),
                n_train: session.train().len(),
                n_test: session.test().len(),
                n_nodes: report.tree.n_nodes(),
                n_leaves: report.tree.n_leaves(),
                depth: report.tree.depth(),
                pruned_nodes: report.pruned_nodes,
                build_ms: millis(report.build_duration),
                evaluate_ms: millis(evaluation.duration()),
                accuracy: evaluation.accuracy(),
                mcc: evaluation.mcc(),
                fallbacks: evaluation.fallbacks(),
                labels,
                confusion_matrix,
                class_metrics: evaluation
                    .confusion()
                    .class_metrics()
                    .into_iter()
                    .map(|m| ClassMetricsEntry {
                        class: m.label,
                        precision: m.precision,
                        recall: m.recall,
                        f1: m.f1,
                        support: m.support,
                    })
                    .collect(),
            };

            let buckets: BTreeMap<String, Vec<String>> = evaluation
                .predictions()
                .iter()
                .map(|(class, ids)| (class.clone(), ids.iter().map(|id| id.to_string()).collect()))
                .collect();

            let criterion = summary.criterion.clone();
            let mut artifacts = vec![
                display(&writer.write_run(&summary)?),
                display(&writer.write_predictions(&buckets)?),
                display(&writer.write_importance(
                    &data.target,
                    &criterion,
                    &importance_rows(&report.importance),
                )?),
                display(&writer.write_tree(&data.target, &tree_nodes(&report.tree))?),
            ];
            if save_model {
                report
                    .tree
                    .save(writer.model_path())
                    .context("failed to save model")?;
                artifacts.push(display(&writer.model_path()));
            }

            let output = RunOutput {
                experiment: &data.experiment,
                n_train: summary.n_train,
                n_test: summary.n_test,
                n_nodes: summary.n_nodes,
                pruned_nodes: summary.pruned_nodes,
                accuracy: summary.accuracy,
                mcc: summary.mcc,
                fallbacks: summary.fallbacks,
                artifacts,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::CrossValidate {
            input,
            folds,
            shuffle_seed,
            parallel,
            data,
            tree,
        } => {
            let request = build_request(&data, &tree)?;
            let writer = open_writer(&data)?;
            let mut session = Session::new(record_parser(&data));
            let n_records = session
                .load_pooled(read_lines(&input)?)
                .context("failed to parse records")?;

            let cv = CrossValidation::new(folds)
                .with_shuffle_seed(shuffle_seed)
                .with_parallel(parallel);
            let result = session
                .cross_validate(&request, &cv)
                .context("cross-validation failed")?
                .ready()
                .context("no records loaded")?;
            info!(
                mean_accuracy = result.mean_accuracy,
                std_accuracy = result.std_accuracy,
                "cross-validation complete"
            );

            let (labels, confusion_matrix) = confusion_parts(&result.confusion_matrix);
            let summary = CvSummary {
                target: data.target.clone(),
                criterion: request.config().criterion().to_string(),
                n_folds: folds,
                n_records,
                shuffle_seed,
                mean_accuracy: result.mean_accuracy,
                std_accuracy: result.std_accuracy,
                mean_mcc: result.mean_mcc,
                mean_build_ms: result.mean_build_duration_ms,
                folds: result
                    .folds
                    .iter()
                    .map(|f| FoldEntry {
                        fold: f.fold,
                        n_train: f.n_train,
                        n_test: f.n_test,
                        accuracy: f.accuracy,
                        mcc: f.mcc,
                        build_ms: f.build_duration_ms,
                    })
                    .collect(),
                labels,
                confusion_matrix,
            };
            let path = writer.write_cv(&summary)?;

            let output = CvOutput {
                experiment: &data.experiment,
                n_records,
                n_folds: folds,
                mean_accuracy: summary.mean_accuracy,
                std_accuracy: summary.std_accuracy,
                mean_mcc: summary.mean_mcc,
                artifacts: vec![display(&path)],
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Importance { input, data, tree } => {
            let request = build_request(&data, &tree)?;
            let writer = open_writer(&data)?;
            let mut session = Session::new(record_parser(&data));
            let n_train = session
                .load_train(read_lines(&input)?)
                .context("failed to parse records")?;

            let table = session
                .feature_table(&request)
                .context("building the tree failed")?
                .ready()
                .context("no records loaded")?;
            let rows = importance_rows(&table);
            let criterion = request.config().criterion().to_string();
            let path = writer.write_importance(&data.target, &criterion, &rows)?;

            let output = ImportanceOutput {
                experiment: &data.experiment,
                n_train,
                features: &rows,
                artifacts: vec![display(&path)],
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Export {
            input,
            model,
            data,
            tree,
        } => {
            let writer = open_writer(&data)?;
            let decision_tree = match (model, input) {
                (Some(model), _) => DecisionTree::load(&model).context("failed to load model")?,
                (None, Some(input)) => {
                    let request = build_request(&data, &tree)?;
                    let mut session = Session::new(record_parser(&data));
                    session
                        .load_train(read_lines(&input)?)
                        .context("failed to parse records")?;
                    request
                        .config()
                        .train(session.train(), session.test(), request.target())
                        .context("building the tree failed")?
                        .tree
                }
                (None, None) => anyhow::bail!("either --input or --model is required"),
            };
            info!(n_nodes = decision_tree.n_nodes(), "tree ready for export");

            let path = writer.write_tree(decision_tree.target(), &tree_nodes(&decision_tree))?;

            let output = ExportOutput {
                experiment: &data.experiment,
                n_nodes: decision_tree.n_nodes(),
                n_leaves: decision_tree.n_leaves(),
                depth: decision_tree.depth(),
                artifacts: vec![display(&path)],
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
