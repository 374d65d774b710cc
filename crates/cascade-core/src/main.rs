use cascade_core::{
    Cascade, CascadeConfig, CascadeEvent, Key, StageSpec, StaticSource, substring_filter,
};
use clap::{value_parser, Arg, Command as Cli};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Demo candidate: an identifier plus a human description, filtered on both
/// and sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Item {
    id: String,
    label: String,
}

impl Item {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.label)
    }
}

fn item_filter() -> cascade_core::FilterFn<Item> {
    let fields: Vec<fn(&Item) -> String> = vec![|i| i.id.clone(), |i| i.label.clone()];
    substring_filter(fields, |i: &Item| i.id.clone())
}

fn sources_stage() -> StaticSource<Item> {
    StaticSource::new().with_entry(
        vec![],
        vec![
            Item::new("host-a", "Primary collector"),
            Item::new("host-b", "Backup collector"),
        ],
    )
}

fn flows_stage() -> StaticSource<Item> {
    StaticSource::new()
        .with_entry(
            vec![Item::new("host-a", "Primary collector")],
            vec![
                Item::new("cpu", "Processor load"),
                Item::new("mem", "Memory usage"),
            ],
        )
        .with_entry(
            vec![Item::new("host-b", "Backup collector")],
            vec![Item::new("net", "Network throughput")],
        )
}

fn dimensions_stage() -> StaticSource<Item> {
    StaticSource::new()
        .with_entry(
            vec![
                Item::new("host-a", "Primary collector"),
                Item::new("cpu", "Processor load"),
            ],
            vec![
                Item::new("avg", "Average over window"),
                Item::new("p95", "95th percentile"),
            ],
        )
        .with_entry(
            vec![
                Item::new("host-a", "Primary collector"),
                Item::new("mem", "Memory usage"),
            ],
            vec![Item::new("rss", "Resident set size")],
        )
}

#[tokio::main]
async fn main() {
    let cli = Cli::new("cascade-demo")
        .version("0.1.0")
        .about("Three-stage cascading typeahead selection demo")
        .arg(
            Arg::new("step-ms")
                .long("step-ms")
                .default_value("400")
                .value_parser(value_parser!(u64))
                .help("Pause between scripted interaction steps"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .default_value("info")
                .help("Tracing filter, e.g. cascade_core=debug"),
        );

    let matches = cli.get_matches();
    let step = Duration::from_millis(*matches.get_one::<u64>("step-ms").unwrap());
    let filter = matches.get_one::<String>("log").unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let specs = vec![
        StageSpec {
            filter: item_filter(),
            source: Arc::new(sources_stage()),
        },
        StageSpec {
            filter: item_filter(),
            source: Arc::new(flows_stage()),
        },
        StageSpec {
            filter: item_filter(),
            source: Arc::new(dimensions_stage()),
        },
    ];
    let (handle, mut events) = Cascade::spawn(specs, CascadeConfig::default());

    println!("Running cascade demo...");
    println!("Stages: sources -> flows -> dimensions");
    println!();

    // Scripted interaction: search and commit one candidate per stage.
    handle.start();
    tokio::time::sleep(step).await;

    handle.begin_search(0);
    handle.set_input(0, "primary");
    tokio::time::sleep(step).await;
    handle.press(0, Key::Enter);
    tokio::time::sleep(step).await;

    handle.begin_search(1);
    handle.set_input(1, "cpu");
    tokio::time::sleep(step).await;
    handle.press(1, Key::Enter);
    tokio::time::sleep(step).await;

    handle.begin_search(2);
    handle.press(2, Key::Down);
    handle.press(2, Key::Enter);
    tokio::time::sleep(step).await;

    println!("Events:");
    while let Ok(event) = events.try_recv() {
        match event {
            CascadeEvent::SelectionChanged { stage, selection } => match selection {
                Some(value) => println!("  stage {stage}: committed {value}"),
                None => println!("  stage {stage}: selection cleared"),
            },
            CascadeEvent::Retrieving { stage } => {
                println!("  stage {stage}: retrieving...");
            }
            CascadeEvent::CandidatesReplaced { stage, count } => {
                println!("  stage {stage}: {count} candidates");
            }
            CascadeEvent::RetrievalFailed { stage, error } => {
                println!("  stage {stage}: retrieval failed: {error}");
            }
        }
    }

    println!();
    println!("Final state:");
    let snapshots = handle.snapshot().await;
    let mut complete = true;
    for (index, stage) in snapshots.iter().enumerate() {
        match &stage.selection {
            Some(value) => println!("  stage {index}: {value}"),
            None => {
                complete = false;
                println!("  stage {index}: (no selection)");
            }
        }
    }

    std::process::exit(if complete { 0 } else { 1 });
}
