use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use clap::{arg, command, value_parser, Arg, Command};
use colored::Colorize;
use hvm_trace::error::set_miette_hook;
use hvm_trace::location::FileName;
use hvm_trace::net::{Graph, Reconstructor, Showable, Shower, Snapshot, Stats};
use hvm_trace::trace::decode;
use hvm_trace::{reconstruct, Replay, TraceError};
use tracing::Level;

fn file_arg() -> Arg {
    arg!(<file> "The trace file to read").value_parser(value_parser!(PathBuf))
}

fn main() {
    let matches = command!()
        .subcommand_required(true)
        .arg(arg!(-v --verbose ... "Log reconstruction steps; repeat for more detail").global(true))
        .subcommand(
            Command::new("summary")
                .about("Count the ops, refs, nodes, redexes and interactions of a trace")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("interactions")
                .about("List every interaction with its redexes and body")
                .arg(file_arg())
                .arg(
                    arg!(--limit <N> "Stop after this many interactions")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("refs")
                .about("List every expanded ref with its nodes")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a trace and show reference counts and freed nodes")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("export")
                .about("Print the reconstructed graph as JSON")
                .arg(file_arg())
                .arg(arg!(--replay "Replay first, so slots carry their final state and counts")),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"));
    set_miette_hook();

    let Some((command, args)) = matches.subcommand() else {
        unreachable!()
    };
    let file = args.get_one::<PathBuf>("file").unwrap().clone();
    let Some(source) = read(&file) else {
        exit(1);
    };

    let result = match command {
        "summary" => summary(&source),
        "interactions" => interactions(&source, args.get_one::<usize>("limit").copied()),
        "refs" => refs(&source),
        "replay" => replay(&source),
        "export" => export(&source, args.get_flag("replay")),
        _ => unreachable!(),
    };

    if let Err(err) = result {
        let report = err.to_report(&FileName::from(file.as_path()), source);
        eprintln!("{:?}", report);
        exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read(file: &Path) -> Option<Arc<str>> {
    match fs::read_to_string(file) {
        Ok(source) => Some(Arc::from(source)),
        Err(err) => {
            eprintln!(
                "{}: {} ({})",
                "Could not read file".bright_red(),
                file.display(),
                err
            );
            None
        }
    }
}

fn summary(source: &str) -> Result<(), TraceError> {
    let mut reconstructor = Reconstructor::new(decode(source)?);
    reconstructor.run()?;
    let stats = Stats::collect(reconstructor.graph(), reconstructor.matcher());
    println!("{}", "Trace summary:".bright_green());
    print!("{}", stats.show());
    Ok(())
}

fn interactions(source: &str, limit: Option<usize>) -> Result<(), TraceError> {
    let graph = reconstruct(source)?;
    let shower = Shower::from_graph(&graph);
    for id in graph.interactions().take(limit.unwrap_or(usize::MAX)) {
        print!("{}", Showable(id, &shower));
    }
    Ok(())
}

fn refs(source: &str) -> Result<(), TraceError> {
    let graph = reconstruct(source)?;
    print_refs(&Shower::from_graph(&graph), &graph);
    Ok(())
}

fn print_refs(shower: &Shower, graph: &Graph) {
    for id in graph.refs() {
        print!("{}", Showable(id, shower));
    }
}

fn replay(source: &str) -> Result<(), TraceError> {
    let mut replay = Replay::new(reconstruct(source)?)?;
    replay.run_to_end()?;

    println!("{}", "Reference counts:".bright_green());
    let mut row = String::new();
    for (index, (location, refcount)) in replay.refcounts().iter().enumerate() {
        let cell = format!("{:>4}:{:<3}", location, refcount.count);
        if refcount.free {
            row += &format!("{}", cell.yellow());
        } else {
            row += &cell;
        }
        if index % 8 == 7 {
            println!("{}", row);
            row.clear();
        }
    }
    if !row.is_empty() {
        println!("{}", row);
    }

    println!("{}", "Final state:".bright_green());
    let shower = Shower::from_graph(replay.graph()).with_refcounts(replay.refcounts());
    print_refs(&shower, replay.graph());
    Ok(())
}

fn export(source: &str, replayed: bool) -> Result<(), TraceError> {
    let graph = reconstruct(source)?;
    let snapshot = if replayed {
        let mut replay = Replay::new(graph)?;
        replay.run_to_end()?;
        Snapshot::new(replay.graph(), Some(replay.refcounts()))
    } else {
        Snapshot::new(&graph, None)
    };
    match snapshot.to_json() {
        Ok(json) => println!("{}", json),
        Err(err) => eprintln!("{}: {}", "Could not serialize snapshot".bright_red(), err),
    }
    Ok(())
}
