//! Soundscape CLI: terminal ambience player

mod wav;

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use log::{error, info};
use ratatui::prelude::*;
use ratatui::widgets::*;

use soundscape::audio::{
    AmbienceEngine, EnginePhase, FrequencyBuffer, PlayOutcome, PlayRequest, SoundType,
    SourceKind,
};
use soundscape::config::audio::{DEFAULT_SAMPLE_DURATION_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME};
use soundscape::config::EngineConfig;
use soundscape::synth::ProceduralGenerator;

#[derive(Parser)]
#[command(name = "soundscape", about = "Terminal ambience player", version)]
struct Cli {
    /// JSON engine config (asset URLs, timeouts)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play an ambience with a live spectrum
    Play {
        #[arg(value_parser = parse_sound)]
        sound: SoundType,

        /// Initial volume (0.0-1.0)
        #[arg(long, default_value_t = DEFAULT_VOLUME)]
        volume: f32,

        /// Base URL the ambience assets are hosted under
        #[arg(long)]
        asset_base_url: Option<String>,

        /// Give up on a hosted asset after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Write a synthesized loop to a WAV file
    Render {
        #[arg(value_parser = parse_sound)]
        sound: SoundType,

        #[arg(short, long)]
        output: PathBuf,

        /// Loop length in seconds
        #[arg(long, default_value_t = DEFAULT_SAMPLE_DURATION_SECS)]
        seconds: f32,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Repeat the loop this many times in the file
        #[arg(long, default_value_t = 1)]
        loops: u32,

        /// Fixed random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List the ambiences and where each is loaded from
    List,
}

fn parse_sound(s: &str) -> Result<SoundType, String> {
    s.parse::<SoundType>().map_err(|e| e.to_string())
}

struct App {
    sound: SoundType,
    phase: EnginePhase,
    source: Option<SourceKind>,
    spectrum: Vec<u64>,
    bins: Vec<u8>,
    volume: f32,
    muted: bool,
    status: String,
    play_started_at: Option<Instant>,
    pending: Option<PlayRequest>,
    running: bool,
}

/// Bars shown in the spectrum sparkline
const SPECTRUM_BARS: usize = 32;

impl App {
    fn new(bin_count: usize) -> Self {
        Self {
            sound: SoundType::None,
            phase: EnginePhase::Idle,
            source: None,
            spectrum: vec![0; SPECTRUM_BARS],
            bins: vec![0; bin_count],
            volume: DEFAULT_VOLUME,
            muted: false,
            status: "Idle".to_string(),
            play_started_at: None,
            pending: None,
            running: true,
        }
    }

    fn request(&mut self, engine: &AmbienceEngine, sound: SoundType) {
        match engine.play_sound(sound) {
            Ok(request) => {
                self.status = if sound.is_none() {
                    "Stopped".to_string()
                } else {
                    format!("Starting {}...", sound)
                };
                self.play_started_at = None;
                self.pending = Some(request);
            }
            Err(e) => {
                error!("play_sound({}) failed: {}", sound, e);
                self.status = format!("Error: {}", e);
            }
        }
    }

    fn poll_pending(&mut self) {
        let Some(request) = self.pending.as_ref() else {
            return;
        };
        let Some(outcome) = request.wait_timeout(Duration::ZERO) else {
            return;
        };
        self.status = match outcome {
            PlayOutcome::Remote | PlayOutcome::Synthetic => {
                self.play_started_at = Some(Instant::now());
                "Playing".to_string()
            }
            PlayOutcome::Stopped => "Stopped".to_string(),
            PlayOutcome::Superseded => self.status.clone(),
            PlayOutcome::Failed(reason) => format!("Error: {}", reason),
        };
        self.pending = None;
    }

    fn update(&mut self, engine: &AmbienceEngine, buffer: &FrequencyBuffer) {
        let state = engine.state();
        self.sound = state.current_sound;
        self.phase = state.phase;
        self.source = state.source;
        self.volume = state.volume;
        self.muted = state.is_muted;

        buffer.read_into(&mut self.bins);
        fold_spectrum(&self.bins, &mut self.spectrum);
    }
}

/// Collapse byte bins into bars scaled 0-100, keeping each group's peak
fn fold_spectrum(bins: &[u8], bars: &mut [u64]) {
    if bars.is_empty() {
        return;
    }
    let per_bar = (bins.len() / bars.len()).max(1);
    for (i, bar) in bars.iter_mut().enumerate() {
        let peak = bins
            .iter()
            .skip(i * per_bar)
            .take(per_bar)
            .copied()
            .max()
            .unwrap_or(0);
        *bar = peak as u64 * 100 / 255;
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Play {
            sound,
            volume,
            asset_base_url,
            timeout_ms,
        } => {
            if asset_base_url.is_some() {
                config.asset_base_url = asset_base_url;
            }
            if let Some(ms) = timeout_ms {
                config.load_timeout_ms = ms;
            }
            config.validate()?;
            run_player(config, sound, volume)
        }
        Command::Render {
            sound,
            output,
            seconds,
            sample_rate,
            loops,
            seed,
        } => run_render(sound, &output, seconds, sample_rate, loops, seed),
        Command::List => {
            run_list(&config);
            Ok(())
        }
    }
}

fn run_render(
    sound: SoundType,
    output: &Path,
    seconds: f32,
    sample_rate: u32,
    loops: u32,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut generator = ProceduralGenerator::new(sample_rate, seconds);
    if let Some(seed) = seed {
        generator = generator.with_seed(seed);
    }

    let started = Instant::now();
    let buffer = generator.generate(sound)?;
    info!(
        "Synthesized {} in {} ms",
        sound,
        started.elapsed().as_millis()
    );

    wav::write_loop(output, &buffer, loops)?;
    println!(
        "Wrote {} ({:.1}s x {}, {} Hz, peak {:.2}, rms {:.3}) to {}",
        sound,
        buffer.duration().as_secs_f32(),
        loops.max(1),
        buffer.sample_rate(),
        buffer.peak(),
        buffer.rms(),
        output.display()
    );
    Ok(())
}

fn run_list(config: &EngineConfig) {
    for (i, sound) in SoundType::AMBIENCES.iter().enumerate() {
        let source = config
            .asset_url(*sound)
            .unwrap_or_else(|| "(synthesized)".to_string());
        println!("  {}  {:<12} {}", i + 1, sound.name(), source);
    }
}

fn run_player(
    config: EngineConfig,
    sound: SoundType,
    volume: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = AmbienceEngine::new(config)?;
    engine.set_volume(volume);
    let buffer = engine.frequency_buffer();

    let mut app = App::new(buffer.len());
    app.request(&engine, sound);

    // Suppress stderr during TUI. ALSA/PulseAudio and env_logger write to
    // stderr, which corrupts the ratatui display.
    let saved_stderr = unsafe { libc::dup(2) };
    {
        let devnull = std::fs::File::open("/dev/null")?;
        unsafe { libc::dup2(devnull.as_raw_fd(), 2) };
    }

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(33); // ~30fps
    let mut last_tick = Instant::now();

    while app.running {
        terminal.draw(|f| draw_ui(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            app.running = false;
                        }
                        KeyCode::Char(c @ '1'..='6') => {
                            let index = c as usize - '1' as usize;
                            app.request(&engine, SoundType::AMBIENCES[index]);
                        }
                        KeyCode::Char('s') => {
                            app.request(&engine, SoundType::None);
                        }
                        KeyCode::Char('m') => {
                            engine.toggle_mute();
                        }
                        KeyCode::Char('+') | KeyCode::Char('=') => {
                            engine.set_volume(engine.volume() + 0.05);
                        }
                        KeyCode::Char('-') => {
                            engine.set_volume(engine.volume() - 0.05);
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            app.poll_pending();
            app.update(&engine, &buffer);
        }
    }

    // Dispose while still in alternate screen (device teardown may log)
    engine.dispose();
    drop(engine);

    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    if saved_stderr >= 0 {
        unsafe {
            libc::dup2(saved_stderr, 2);
            libc::close(saved_stderr);
        }
    }

    Ok(())
}

fn draw_ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" Soundscape v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::vertical([
        Constraint::Length(4), // now playing
        Constraint::Length(8), // spectrum
        Constraint::Length(3), // ambience menu
        Constraint::Length(2), // help bar
    ])
    .split(inner);

    draw_status(f, app, chunks[0]);
    draw_spectrum(f, app, chunks[1]);
    draw_menu(f, app, chunks[2]);
    draw_help(f, app, chunks[3]);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let status_color = if app.status == "Playing" {
        Color::Green
    } else if app.status.starts_with("Error") {
        Color::Red
    } else {
        Color::Yellow
    };
    let source_str = match app.source {
        Some(SourceKind::Remote) => "Hosted asset",
        Some(SourceKind::Synthetic) => "Synthesized",
        None => "---",
    };
    let uptime = match app.play_started_at {
        Some(started) => format_uptime(started),
        None => "00:00".to_string(),
    };

    let text = vec![
        Line::from(vec![
            Span::styled("  Ambience: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.sound.name(), Style::default().fg(Color::White).bold()),
            Span::raw("  "),
            Span::styled("Source: ", Style::default().fg(Color::DarkGray)),
            Span::styled(source_str, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("  Status: ", Style::default().fg(Color::DarkGray)),
            Span::styled(&app.status, Style::default().fg(status_color)),
            Span::raw("  "),
            Span::styled("Phase: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.phase.to_string(), Style::default().fg(Color::White)),
            Span::raw("  "),
            Span::styled("Uptime: ", Style::default().fg(Color::DarkGray)),
            Span::styled(uptime, Style::default().fg(Color::White)),
        ]),
    ];
    f.render_widget(Paragraph::new(text), area);
}

fn draw_spectrum(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Spectrum ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let sparkline = Sparkline::default()
        .block(block)
        .data(&app.spectrum)
        .max(100)
        .style(Style::default().fg(Color::Cyan));

    f.render_widget(sparkline, area);
}

fn draw_menu(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Ambiences ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let mut spans = vec![Span::raw(" ")];
    for (i, sound) in SoundType::AMBIENCES.iter().enumerate() {
        let style = if *sound == app.sound {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!(" {} {} ", i + 1, sound.name()), style));
        spans.push(Span::raw(" "));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let vol_display = if app.muted {
        "MUTE".to_string()
    } else {
        format!("{}%", (app.volume * 100.0).round() as u32)
    };

    let help = Line::from(vec![
        Span::styled("  '1'-'6' ", Style::default().fg(Color::Yellow)),
        Span::raw("ambience  |  "),
        Span::styled("'s' ", Style::default().fg(Color::Yellow)),
        Span::raw("stop  |  "),
        Span::styled("'m' ", Style::default().fg(Color::Yellow)),
        Span::raw("mute  |  "),
        Span::styled("'+'/'-' ", Style::default().fg(Color::Yellow)),
        Span::raw("volume  |  "),
        Span::styled("'q' ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  |  "),
        Span::styled(
            format!("Vol: {}", vol_display),
            Style::default().fg(Color::Cyan).bold(),
        ),
    ]);

    f.render_widget(Paragraph::new(help).alignment(Alignment::Left), area);
}

fn format_uptime(started: Instant) -> String {
    let secs = started.elapsed().as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
