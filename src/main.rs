use log::{debug, info};
use std::env;
use std::fs::File;
use std::io::{self, prelude::*};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zcore::display_headless::HeadlessDisplay;
use zcore::display_terminal::TerminalDisplay;
use zcore::display_trait::ZMachineDisplay;
use zcore::{Game, Interpreter, InterpreterConfig, RunOutcome};

struct Options {
    story: PathBuf,
    config: Option<PathBuf>,
    seed: Option<u64>,
    headless: bool,
}

fn usage(program: &str) {
    println!("zcore - Z-Machine interpreter for versions 1 to 8");
    println!();
    println!(
        "Usage: {} <story_file> [--config file.toml] [--seed n] [--headless]",
        program
    );
    println!();
    println!("--headless reads commands from stdin and prints the transcript of the");
    println!("main window at the end. It is chosen automatically when stdout is not");
    println!("a terminal.");
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let Some(story) = args.get(1) else {
        return Ok(None);
    };
    if story == "-h" || story == "--help" {
        return Ok(None);
    }
    let mut options = Options {
        story: PathBuf::from(story),
        config: None,
        seed: None,
        headless: false,
    };
    let mut rest = args[2..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--config" => {
                let path = rest.next().ok_or("--config needs a file name")?;
                options.config = Some(PathBuf::from(path));
            }
            "--seed" => {
                let seed = rest.next().ok_or("--seed needs a number")?;
                options.seed = Some(
                    seed.parse()
                        .map_err(|_| format!("Invalid seed: {}", seed))?,
                );
            }
            "--headless" => options.headless = true,
            other => return Err(format!("Unknown option: {}", other)),
        }
    }
    Ok(Some(options))
}

fn read_story(path: &PathBuf) -> Vec<u8> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            match e.kind() {
                io::ErrorKind::NotFound => {
                    eprintln!("Error: Story file not found: {}", path.display());
                }
                io::ErrorKind::PermissionDenied => {
                    eprintln!(
                        "Error: Permission denied accessing story file: {}",
                        path.display()
                    );
                }
                _ => {
                    eprintln!("Error: Cannot open story file '{}': {}", path.display(), e);
                }
            }
            process::exit(1);
        }
    };
    let mut data = Vec::new();
    if let Err(e) = file.read_to_end(&mut data) {
        eprintln!("Error: Cannot read story file '{}': {}", path.display(), e);
        process::exit(1);
    }
    data
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            usage(&args[0]);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            usage(&args[0]);
            process::exit(2);
        }
    };

    let mut config = InterpreterConfig::load(options.config.as_deref())?;
    if options.seed.is_some() {
        config.random_seed = options.seed;
    }

    debug!("Loading story: {}", options.story.display());
    let game = Game::from_memory(read_story(&options.story))?;
    let headless = options.headless || !atty::is(atty::Stream::Stdout);
    info!(
        "Starting v{} story ({} display)",
        game.version(),
        if headless { "headless" } else { "terminal" }
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))?;

    if headless {
        let display = HeadlessDisplay::new(config.screen_width, config.screen_height);
        let handle = display.handle();
        for line in io::stdin().lock().lines() {
            handle.push_line(&line?);
        }
        let mut interpreter = Interpreter::new(game, Box::new(display), config)?
            .with_cancel_handle(cancel);
        let result = interpreter.run();
        print!("{}", handle.main_text());
        io::stdout().flush()?;
        return match result {
            Ok(outcome) => {
                debug!("Headless run ended: {:?}", outcome);
                Ok(())
            }
            Err(e) => {
                eprintln!("\nError during execution: {e}");
                process::exit(1);
            }
        };
    }

    let save_dir = options
        .story
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let display: Box<dyn ZMachineDisplay> =
        Box::new(TerminalDisplay::new(save_dir)?.with_cancel_flag(cancel.clone()));
    let mut interpreter = Interpreter::new(game, display, config)?.with_cancel_handle(cancel);
    let result = interpreter.run();
    let executed = interpreter.instruction_count();

    // restore the terminal before reporting
    drop(interpreter);
    match result {
        Ok(RunOutcome::Quit) => {
            debug!("Story ended after {} instructions", executed);
            Ok(())
        }
        Ok(RunOutcome::Suspended) => {
            println!("Interrupted.");
            Ok(())
        }
        Err(e) => {
            eprintln!("Error during execution: {e}");
            process::exit(1);
        }
    }
}
