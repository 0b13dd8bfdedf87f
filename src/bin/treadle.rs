use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "treadle", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report what a resource looks like before building a pipeline.
    Probe(ProbeArgs),
    /// Build a pipeline from a JSON description and run the consumer.
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Resource to open (path, color:RRGGBB, noise:SEED).
    resource: String,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Input pipeline JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Write delivered frames as numbered PNGs into this directory.
    #[arg(long)]
    out: Option<PathBuf>,

    /// How long to keep the consumer running.
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// Pacing mode: >0 paced to the frame rate, 0 free-run, <0 best-effort.
    #[arg(long, default_value_t = 1)]
    real_time: i32,
}

#[derive(serde::Deserialize, Debug)]
struct PipelineDoc {
    #[serde(default)]
    profile: Option<treadle::Profile>,
    tracks: Vec<TrackDoc>,
    #[serde(default)]
    transitions: Vec<TransitionDoc>,
    #[serde(default)]
    speed: Option<treadle::Speed>,
    #[serde(default)]
    eof: Option<treadle::EofPolicy>,
}

#[derive(serde::Deserialize, Debug)]
enum TrackDoc {
    #[serde(rename = "playlist")]
    Playlist(Vec<String>),
    #[serde(rename = "producer")]
    Producer(String),
}

#[derive(serde::Deserialize, Debug)]
struct TransitionDoc {
    kind: String,
    a: usize,
    b: usize,
    geometry: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Play(args) => cmd_play(args),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let engine = treadle::Engine::with_default_profile();
    let producer = engine
        .try_open(&args.resource)
        .with_context(|| format!("open '{}'", args.resource))?;

    let info = producer
        .probe()
        .context("producer opened but reports no source info")?;
    eprintln!("{}:", args.resource);
    eprintln!("  size:   {}x{}", info.width, info.height);
    eprintln!("  fps:    {}", info.fps.as_f64());
    match info.length {
        Some(len) => eprintln!("  length: {len} frames"),
        None => eprintln!("  length: unbounded"),
    }
    Ok(())
}

fn read_pipeline_json(path: &Path) -> anyhow::Result<PipelineDoc> {
    let f = File::open(path).with_context(|| format!("open pipeline '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: PipelineDoc = serde_json::from_reader(r).with_context(|| "parse pipeline JSON")?;
    Ok(doc)
}

fn build_tractor(
    engine: &treadle::Engine,
    doc: &PipelineDoc,
) -> anyhow::Result<treadle::Tractor> {
    let tractor = treadle::Tractor::new(engine.profile());

    for (index, track) in doc.tracks.iter().enumerate() {
        match track {
            TrackDoc::Producer(resource) => {
                let producer = engine
                    .try_open(resource)
                    .with_context(|| format!("open track {index} resource '{resource}'"))?;
                tractor.add_track(treadle::Track::Producer(producer))?;
            }
            TrackDoc::Playlist(resources) => {
                let playlist = treadle::Playlist::new(engine.profile());
                {
                    let mut guard = playlist.lock();
                    for resource in resources {
                        let producer = engine.try_open(resource).with_context(|| {
                            format!("open track {index} resource '{resource}'")
                        })?;
                        guard.append(producer)?;
                    }
                }
                tractor.add_track(treadle::Track::Playlist(playlist))?;
            }
        }
    }

    for tr in &doc.transitions {
        treadle::parse_transition_kind(&tr.kind)?;
        let geometry = treadle::GeometryAnim::parse(&tr.geometry, engine.profile())?;
        tractor.add_transition(treadle::Transition::composite(tr.a, tr.b, geometry))?;
    }

    if let Some(eof) = doc.eof {
        tractor.set_eof_policy(eof);
    }
    tractor.set_speed(doc.speed.unwrap_or(treadle::Speed::FORWARD));
    Ok(tractor)
}

fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let doc = read_pipeline_json(&args.in_path)?;
    let profile = doc.profile.unwrap_or_default();
    let engine = treadle::Engine::new(profile);

    let tractor = build_tractor(&engine, &doc)?;

    let sink: Box<dyn treadle::FrameSink> = match &args.out {
        Some(dir) => Box::new(treadle::PngSequenceSink::create(dir)?),
        None => Box::new(treadle::NullSink),
    };
    let consumer = treadle::Consumer::new(
        sink,
        treadle::ConsumerOpts {
            real_time: args.real_time,
            ..treadle::ConsumerOpts::default()
        },
    );

    let mut controller = treadle::PlaybackController::new(engine, tractor, consumer)?;
    controller.start()?;

    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds.max(0.0));
    let monitor = controller.monitor();
    while Instant::now() < deadline {
        if let Err(e) = monitor.check_stall(100) {
            eprintln!("warning: {e}");
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    controller.stop();
    eprintln!(
        "stopped at position {} of {}",
        controller.position(),
        controller.playtime()
    );
    Ok(())
}
