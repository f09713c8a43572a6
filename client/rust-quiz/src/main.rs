use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use learnly_quiz::{
    config::Config,
    error::{ErrorKind, QuizError},
    metrics::render_metrics,
    models::{
        api::{SimulatedExamRequest, StartQuizRequest},
        Difficulty, Phase, QuizSession, SavedProgress,
    },
    services::{
        progress_service::{ResumeDecision, ResumePrompt},
        session_controller::{Advance, InitOutcome, SessionController},
        QuizContext,
    },
};

#[derive(Debug, Parser)]
#[command(name = "learnly-quiz", about = "Adaptive quizzes from the terminal", long_about = None)]
struct Cli {
    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Commands {
    /// List available topics
    Topics,
    /// Start a quiz on one topic
    Start {
        topic: String,
        /// Number of questions per batch
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
    /// Start a simulated exam across several topics
    Exam {
        #[arg(required = true, value_delimiter = ',')]
        topics: Vec<String>,
        /// Number of questions per batch
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
    /// Continue a saved session
    Resume { session_id: String },
    /// Show graded answers for a session
    Review { session_id: String },
}

enum BatchEnd {
    Graded,
    Paused,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let provider = match init_tracing(&config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let result = run(config, cli.command).await;

    if cli.metrics {
        match render_metrics() {
            Ok(text) => eprintln!("{}", text),
            Err(e) => tracing::warn!("Failed to render metrics: {}", e),
        }
    }

    shutdown_telemetry(provider);

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run(config: Config, command: Commands) -> anyhow::Result<()> {
    let ctx = QuizContext::new(config)
        .await
        .context("Failed to set up quiz client")?;
    let terminal = Terminal::new();

    match command {
        Commands::Topics => {
            let topics = ctx.api.list_topics().await?;
            if topics.is_empty() {
                println!("No topics available.");
            }
            for topic in topics {
                println!("{:<24} {}", topic.topic_id, topic.name);
            }
        }
        Commands::Start { topic, count } => {
            let request = StartQuizRequest {
                topic,
                num_questions: count.unwrap_or(ctx.config.default_question_count),
            };
            let response = ctx.api.start_quiz(&request).await?;
            if let Some(message) = &response.message {
                println!("{}", message);
            }
            run_quiz(&ctx, &terminal, &terminal, QuizSession::from_start(&response)).await?;
        }
        Commands::Exam { topics, count } => {
            let request = SimulatedExamRequest {
                topics,
                num_questions: count.unwrap_or(ctx.config.default_question_count),
            };
            let response = ctx.api.start_simulated_exam(&request).await?;
            if let Some(message) = &response.message {
                println!("{}", message);
            }
            run_quiz(&ctx, &terminal, &terminal, QuizSession::from_start(&response)).await?;
        }
        Commands::Resume { session_id } => {
            let Some(saved) = ctx.progress.load_existing(&session_id).await else {
                bail!("No saved progress for session {}", session_id);
            };
            match ctx.progress.load_session(&session_id).await {
                Some(session) => run_quiz(&ctx, &terminal, &terminal, session).await?,
                None => {
                    tracing::warn!(
                        "No session descriptor for {}; starting over is not offered",
                        session_id
                    );
                    let session = QuizSession::from_saved(&session_id, &saved);
                    run_quiz(&ctx, &terminal, &ResumeOnly(&terminal), session).await?;
                }
            }
        }
        Commands::Review { session_id } => {
            let review = ctx.api.review(&session_id).await?;
            if let Some(score) = review.score_percent {
                println!("Score: {:.1}%", score);
            }
            for (i, graded) in review.graded.iter().enumerate() {
                let mark = if graded.is_correct { "✓" } else { "✗" };
                println!(
                    "{:>3}. {} {} (answer: {})",
                    i + 1,
                    mark,
                    graded.selected_answer,
                    graded.correct_answer
                );
                if let Some(explanation) = &graded.explanation {
                    println!("       {}", explanation);
                }
            }
        }
    }

    Ok(())
}

async fn run_quiz(
    ctx: &QuizContext,
    terminal: &Terminal,
    prompt: &dyn ResumePrompt,
    session: QuizSession,
) -> anyhow::Result<()> {
    let session_id = session.session_id.clone();
    let mut controller = ctx.controller(session);

    let pause = controller.pause_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pause.pause();
        }
    });

    match controller.initialize(prompt).await? {
        InitOutcome::Cancelled => {
            println!("Cancelled. Your saved progress was left untouched.");
            return Ok(());
        }
        InitOutcome::Resumed => println!("Resuming session {}.", session_id),
        InitOutcome::Fresh => {}
    }

    loop {
        println!("\n== {} ==", controller.phase().title());

        if let BatchEnd::Paused = play_batch(&mut controller, terminal).await? {
            println!(
                "\nPaused. Continue later with: learnly-quiz resume {}",
                session_id
            );
            return Ok(());
        }

        print_result(&controller);

        let answer = terminal
            .ask("Continue with an adaptive batch? [y/N or easy/medium/hard] ")
            .await
            .unwrap_or_default();
        let difficulty = match answer.to_lowercase().as_str() {
            "y" | "yes" => None,
            other => match other.parse::<Difficulty>() {
                Ok(difficulty) => Some(difficulty),
                Err(_) => break,
            },
        };

        if let Err(e) = controller.continue_adaptive(difficulty).await {
            println!("Could not load the next batch: {}", e);
            break;
        }
    }

    Ok(())
}

async fn play_batch(
    controller: &mut SessionController,
    terminal: &Terminal,
) -> anyhow::Result<BatchEnd> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        if controller.awaiting_submission() {
            return submit_until_graded(controller, terminal).await;
        }
        if controller.phase() == Phase::Completed {
            return Ok(BatchEnd::Graded);
        }

        render_question(controller);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if controller.is_paused() {
                        controller.pause();
                        return Ok(BatchEnd::Paused);
                    }
                    controller.tick().await;
                }
                line = terminal.read_line() => {
                    let Some(line) = line else {
                        controller.pause();
                        return Ok(BatchEnd::Paused);
                    };
                    if handle_input(controller, &line).await? {
                        break;
                    }
                    if controller.is_paused() {
                        return Ok(BatchEnd::Paused);
                    }
                }
            }
        }
    }
}

/// Returns true once the question on screen has changed.
async fn handle_input(controller: &mut SessionController, line: &str) -> anyhow::Result<bool> {
    let input = line.trim();

    if input.eq_ignore_ascii_case("p") {
        controller.pause();
        return Ok(false);
    }

    if input.is_empty() {
        return match controller.confirm_and_advance().await {
            Ok(Advance::Next { .. }) | Ok(Advance::Completed(_)) => Ok(true),
            Err(QuizError::AnswerRequired) => {
                println!("{}", QuizError::AnswerRequired);
                Ok(false)
            }
            Err(QuizError::Paused) => Ok(false),
            Err(e) if controller.awaiting_submission() => {
                println!("Submission failed: {}", e);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        };
    }

    let choice = controller
        .current_question()
        .and_then(|question| {
            input
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| question.choices.get(i))
                .cloned()
        })
        .unwrap_or_else(|| input.to_string());

    match controller.select_answer(&choice).await {
        Ok(()) => println!("Selected: {}. Press Enter to confirm.", choice),
        Err(e) if e.kind() == ErrorKind::Validation => println!("{}", e),
        Err(QuizError::Paused) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(false)
}

async fn submit_until_graded(
    controller: &mut SessionController,
    terminal: &Terminal,
) -> anyhow::Result<BatchEnd> {
    loop {
        let answer = terminal
            .ask("Your answers are saved. Submit now? [Y/n] ")
            .await;
        match answer.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("n") | Some("no") => {
                controller.pause();
                return Ok(BatchEnd::Paused);
            }
            _ => {}
        }

        match controller.submit().await {
            Ok(_) => return Ok(BatchEnd::Graded),
            Err(QuizError::Paused) => return Ok(BatchEnd::Paused),
            Err(e) if e.kind() == ErrorKind::Authentication => return Err(e.into()),
            Err(e) => println!("Submission failed: {}", e),
        }
    }
}

fn render_question(controller: &SessionController) {
    let snapshot = controller.snapshot();
    let Some(question) = controller.current_question() else {
        return;
    };

    println!(
        "\n[{}/{}] {} · {} · {:02}:{:02}",
        snapshot.current_question_index + 1,
        snapshot.questions.len(),
        question.topic,
        question.difficulty,
        snapshot.elapsed_seconds / 60,
        snapshot.elapsed_seconds % 60
    );
    println!("{}", question.text);
    for (i, choice) in question.choices.iter().enumerate() {
        let marker = if snapshot.selected_answer.as_deref() == Some(choice.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(" {}{}. {}", marker, i + 1, choice);
    }
    println!("(number to select, Enter to confirm, p to pause)");
}

fn print_result(controller: &SessionController) {
    let Some(result) = controller.last_result() else {
        return;
    };
    let score = controller.score();

    println!(
        "\nCorrect: {}  Wrong: {}  Score: {:.1}%",
        result.correct, result.wrong, result.score_percent
    );
    println!(
        "Rank {}  ·  best streak {}  ·  {} points",
        score.rank, score.max_streak, score.total_score
    );
    if let Some(next) = result.next_difficulty {
        println!("Suggested next difficulty: {}", next);
    }
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<QuizError>().map(QuizError::kind) {
        Some(ErrorKind::Authentication) => {
            eprintln!("{}", error);
            eprintln!(
                "Sign in again and run `learnly-quiz resume <session-id>`; your progress is saved."
            );
        }
        Some(ErrorKind::Transient) => {
            eprintln!("{}", error);
            eprintln!("The quiz service is unreachable right now. Try again shortly.");
        }
        _ => eprintln!("Error: {:#}", error),
    }
}

/// Line-oriented stdin shared by the quiz loop and the resume prompt.
struct Terminal {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// `None` once stdin is closed.
    async fn read_line(&self) -> Option<String> {
        let mut lines = self.lines.lock().await;
        lines.next_line().await.ok().flatten()
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
        self.read_line().await.map(|line| line.trim().to_string())
    }
}

impl Terminal {
    async fn choose_saved(
        &self,
        session_id: &str,
        saved: &SavedProgress,
        allow_restart: bool,
    ) -> ResumeDecision {
        println!(
            "Found unfinished session {}: {} question {}/{}, {} answered.",
            session_id,
            saved.phase.title(),
            saved.current_question_index + 1,
            saved.questions.len(),
            saved.answers.len()
        );

        let question = if allow_restart {
            "[r]esume, [s]tart over or [c]ancel? "
        } else {
            "[r]esume or [c]ancel? "
        };
        loop {
            let Some(answer) = self.ask(question).await else {
                return ResumeDecision::Cancel;
            };
            match answer.to_lowercase().as_str() {
                "r" | "resume" | "" => return ResumeDecision::Resume,
                "s" | "start over" | "restart" if allow_restart => {
                    return ResumeDecision::Restart
                }
                "c" | "cancel" => return ResumeDecision::Cancel,
                _ if allow_restart => println!("Please answer r, s or c."),
                _ => println!("Please answer r or c."),
            }
        }
    }
}

#[async_trait]
impl ResumePrompt for Terminal {
    async fn choose(&self, session_id: &str, saved: &SavedProgress) -> ResumeDecision {
        self.choose_saved(session_id, saved, true).await
    }
}

/// Prompt for sessions rebuilt from a bare snapshot, where the starting
/// phase of a fresh batch is unknown.
struct ResumeOnly<'a>(&'a Terminal);

#[async_trait]
impl ResumePrompt for ResumeOnly<'_> {
    async fn choose(&self, session_id: &str, saved: &SavedProgress) -> ResumeDecision {
        self.0.choose_saved(session_id, saved, false).await
    }
}

fn init_tracing(
    config: &Config,
) -> anyhow::Result<Option<opentelemetry_sdk::trace::SdkTracerProvider>> {
    let (provider, otel_layer) = match &config.otlp_endpoint {
        Some(endpoint) => {
            let (provider, tracer) = init_telemetry(endpoint)?;
            (
                Some(provider),
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            )
        }
        None => (None, None),
    };

    // Logs go to stderr so they never interleave with questions on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learnly_quiz=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    Ok(provider)
}

fn init_telemetry(
    otlp_endpoint: &str,
) -> anyhow::Result<(
    opentelemetry_sdk::trace::SdkTracerProvider,
    opentelemetry_sdk::trace::Tracer,
)> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("learnly-quiz")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("learnly-quiz");
    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok((provider, tracer))
}

fn shutdown_telemetry(provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to flush traces: {}", e);
        }
    }
}
