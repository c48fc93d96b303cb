//! LS-8 Emulator - CLI Entry Point
//!
//! Commands:
//! - `ls8-emu run <program>` - Run an `.ls8` or `.asm` file
//! - `ls8-emu debug <program>` - Interactive debugger
//! - `ls8-emu asm <source>` - Assemble to `.ls8`
//! - `ls8-emu disasm <program>` - Disassemble an `.ls8` file

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of the LS-8, an 8-bit register machine for teaching CPU architecture")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the .ls8 or .asm file to execute
        program: String,
        /// Maximum number of cycles to run (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_cycles: u64,
        /// Show a trace line after every instruction
        #[arg(short, long)]
        trace: bool,
        /// Dump the final machine state as JSON instead of a summary
        #[arg(short, long)]
        json: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the .ls8 or .asm file to debug
        program: String,
    },
    /// Assemble source to an .ls8 program file
    Asm {
        /// Path to the source file
        source: String,
        /// Output .ls8 file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble an .ls8 file to readable text
    Disasm {
        /// Path to the .ls8 file
        program: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, max_cycles, trace, json }) => {
            run_program(&program, max_cycles, trace, json);
        }
        Some(Commands::Debug { program }) => {
            debug_program(&program);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        None => {
            println!("LS-8 Emulator v0.1.0");
            println!("An 8-bit register machine for teaching CPU architecture");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_program();
        }
    }
}

/// Load a program image from an `.asm` or `.ls8` file.
fn load_image(path: &str) -> Vec<u8> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    if path.ends_with(".asm") {
        match ls8::assemble(&source) {
            Ok(bytes) => {
                println!("📝 Assembled {} bytes", bytes.len());
                bytes
            }
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match ls8::parse_program(&source) {
            Ok(bytes) => {
                println!("📂 Loaded {} bytes", bytes.len());
                bytes
            }
            Err(e) => {
                eprintln!("❌ Failed to load program: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_program(path: &str, max_cycles: u64, trace: bool, json: bool) {
    use ls8::Cpu;
    use ls8::asm::disasm::format_instruction;

    println!("🔧 Running: {}", path);

    let image = load_image(path);
    if image.is_empty() {
        eprintln!("❌ No program bytes to execute");
        std::process::exit(1);
    }

    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(&image) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("━━━ Execution ━━━");

    let mut cycles = 0u64;
    while cpu.is_running() && cycles < max_cycles {
        let pc = cpu.regs.pc;

        match cpu.step() {
            Ok(step) => {
                if trace {
                    println!("0x{:02X}: {:<12} {}", pc, format_instruction(&step.instr), cpu.trace());
                }
                if let Some(value) = step.output {
                    println!("{}", value);
                }
                cycles += 1;
            }
            Err(e) => {
                eprintln!("❌ CPU error at PC=0x{:02X}: {}", pc, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    if json {
        match serde_json::to_string_pretty(&cpu) {
            Ok(dump) => println!("{}", dump),
            Err(e) => {
                eprintln!("❌ Failed to serialize state: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("━━━ Result ━━━");
        println!("Cycles: {}", cycles);
        println!("State: {:?}", cpu.state);
        for r in 0..8u8 {
            let sp = if r == ls8::cpu::registers::SP { " (SP)" } else { "" };
            println!("R{}{}: 0x{:02X} ({})", r, sp, cpu.regs.read(r), cpu.regs.read(r));
        }
        println!("Flags: {}", cpu.regs.flags);
    }

    if cycles >= max_cycles {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }
}

fn debug_program(path: &str) {
    use ls8::tui::run_debugger;

    println!("🔍 Loading: {}", path);

    let image = load_image(path);
    if image.is_empty() {
        eprintln!("❌ No program bytes to execute");
        std::process::exit(1);
    }

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = run_debugger(image) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use ls8::asm::program::save_bytes;

    let out_path = output.unwrap_or_else(|| {
        source_path.replace(".asm", ".ls8")
    });

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let bytes = match ls8::assemble(&source) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} bytes", bytes.len());

    if let Err(e) = save_bytes(&out_path, &bytes) {
        eprintln!("❌ Failed to save program: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(path: &str) {
    use ls8::disassemble;

    println!("📖 Disassembling: {}", path);
    println!();

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let bytes = match ls8::parse_program(&source) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", disassemble(&bytes));
}

fn demo_program() {
    use ls8::Cpu;

    println!("━━━ Demo: print the number 8 ━━━");
    println!();

    // LDI R0,8 / PRN R0 / HLT
    let image = [0b1000_0010, 0, 8, 0b0100_0111, 0, 0b0000_0001];

    let mut cpu = Cpu::new();
    if cpu.load_program(&image).is_err() {
        return;
    }

    match cpu.run() {
        Ok(executed) => {
            for value in cpu.output() {
                println!("{}", value);
            }
            println!();
            println!("✓ Executed {} instructions, state: {:?}", executed, cpu.state);
        }
        Err(e) => {
            eprintln!("❌ Demo failed: {}", e);
        }
    }
}
