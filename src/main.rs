use std::io::Write as _;
use std::time::Duration;

use clap::Parser;

use dupe_photos::cli::Cli;
use dupe_photos::model::Kind;
use dupe_photos::orchestrator::{self, Orchestrator, State};
use dupe_photos::pool::{self, Shape, WORKER_SUBCOMMAND};

fn main() -> anyhow::Result<()> {
    // The process-pool shape re-execs this binary as `<exe>
    // __fingerprint_worker <file|dir> <path>`; intercept that before
    // normal CLI parsing, since it isn't part of the documented argument
    // surface.
    let mut args = std::env::args();
    let _exe = args.next();
    if let Some(first) = args.next() {
        if first == WORKER_SUBCOMMAND {
            let shape_flag = args.next().ok_or_else(|| {
                anyhow::anyhow!("{} requires a shape argument", WORKER_SUBCOMMAND)
            })?;
            let shape = match shape_flag.as_str() {
                "file" => Shape::PerFile,
                "dir" => Shape::PerDirectory,
                other => anyhow::bail!("unknown worker shape {:?}", other),
            };
            let path = args.next().map(std::path::PathBuf::from).ok_or_else(|| {
                anyhow::anyhow!("{} requires a path argument", WORKER_SUBCOMMAND)
            })?;
            pool::run_worker(shape, &path);
            return Ok(());
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if !cli.root.is_dir() {
        anyhow::bail!("{:?} is not a directory", cli.root);
    }

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
    }

    let orchestrator = Orchestrator::new();
    let rx = orchestrator.run(cli.root.clone(), cli.resolved_cfe(), cli.batch_threshold);

    let ticker_start = std::time::Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => report_progress(&event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        match orchestrator.state() {
            State::Done | State::Cancelled => break,
            _ => {}
        }
    }
    log::debug!("pipeline finished after {:?}", ticker_start.elapsed());

    let store = orchestrator.store();
    let (groups, originals, copies) = {
        let guard = store.lock().unwrap();
        let mut group_ids = Vec::new();
        for page in guard.get_all_page_numbers() {
            group_ids.extend(guard.get_group_ids_of_page(page));
        }
        let mut originals = 0usize;
        let mut copies = 0usize;
        for group_id in &group_ids {
            for item in guard.get_group_items(group_id) {
                match item.kind {
                    Kind::Original => originals += 1,
                    Kind::Copy => copies += 1,
                }
            }
        }
        (group_ids.len(), originals, copies)
    };

    eprintln!(
        "found {} duplicate group(s): {} original(s), {} copy/copies",
        groups, originals, copies
    );

    if let Some(dump_path) = &cli.dump {
        write_report(dump_path, &store)?;
    }

    if cli.clean {
        store.lock().unwrap().set_selected_of_kind(Kind::Copy, true);
        let removed = orchestrator::delete_selected(&store);
        eprintln!("deleted {} file(s)", removed);
    }

    Ok(())
}

fn report_progress(event: &dupe_photos::progress::Event) {
    use dupe_photos::progress::Event::*;
    match event {
        FindRunning { done, total } => {
            eprint!("\rscanning: {} / {}", done, total);
            let _ = std::io::stderr().flush();
        }
        FindCompleted { records, start, end } => {
            eprintln!(
                "\nfingerprinted {} file(s) in {:?}",
                records,
                end.duration_since(*start)
            );
        }
        DupRunning { done, total } => {
            eprint!("\rgrouping: {} / {}", done, total);
            let _ = std::io::stderr().flush();
        }
        DupCompleted { groups, start, end } => {
            eprintln!(
                "\ngrouped into {} duplicate set(s) in {:?}",
                groups,
                end.duration_since(*start)
            );
        }
    }
}

fn write_report(
    path: &std::path::Path,
    store: &std::sync::Arc<std::sync::Mutex<dupe_photos::review_store::ReviewStore>>,
) -> anyhow::Result<()> {
    let guard = store.lock().unwrap();
    let mut out = String::new();
    out.push_str("# duplicate image report\n");
    for page in guard.get_all_page_numbers() {
        for group_id in guard.get_group_ids_of_page(page) {
            out.push_str(&format!("# {}\n", group_id));
            for item in guard.get_group_items(&group_id) {
                let marker = match item.kind {
                    Kind::Original => "O",
                    Kind::Copy => "D",
                };
                out.push_str(&format!(
                    "{} {} {}\n",
                    marker, item.size_text, item.display_path
                ));
            }
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}
