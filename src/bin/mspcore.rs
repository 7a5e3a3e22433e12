//! A thin command-line front end over the `msp430-core` device layer:
//! open one driver, run one operation, print the result. The
//! interactive shell, symbol-aware disassembly, and file-format
//! decoding a full debugger needs live outside this crate; this binary
//! only exists to exercise the registry and drivers end to end.

use clap::{Parser, Subcommand};

use msp430_core::address::Address;
use msp430_core::device::registry;
use msp430_core::device::{CtlOp, DeviceArgs, DeviceFlags, EraseKind};
use msp430_core::transport::serial::{SerialParity, SerialTransport};

#[derive(Parser, Debug)]
#[command(name = "mspcore", about = "MSP430 debug-probe core, exercised from the command line")]
struct Cli {
    /// Driver name (see `list-drivers`), e.g. `rom-bsl`, `flash-bsl`.
    #[arg(long, env = "MSPCORE_DRIVER")]
    driver: Option<String>,

    /// Serial device path for TTY-backed drivers.
    #[arg(long, env = "MSPCORE_PORT")]
    port: Option<String>,

    /// Use JTAG instead of the default Spy-Bi-Wire link.
    #[arg(long)]
    jtag: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists every driver the registry knows about.
    ListDrivers,
    /// Opens the driver and reads `len` bytes starting at `addr`.
    Read {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        #[arg(value_parser = parse_u32)]
        len: u32,
    },
    /// Opens the driver and writes `hex` bytes starting at `addr`.
    Write {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        hex: String,
    },
    /// Opens the driver and erases main flash.
    EraseMain,
    /// Opens the driver, halts the target, and prints all registers.
    Regs,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn main() {
    let cli = Cli::parse();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .ok();

    if let Err(e) = run(cli) {
        eprintln!("mspcore: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if matches!(cli.command, Command::ListDrivers) {
        for info in registry::DRIVERS {
            println!("{:16} {}", info.name, info.help);
        }
        return Ok(());
    }

    let driver_name = cli
        .driver
        .as_deref()
        .ok_or("--driver is required for this command")?;
    let info = registry::find(driver_name)
        .ok_or_else(|| format!("unknown driver: {}", driver_name))?;

    let port = cli
        .port
        .as_deref()
        .ok_or("--port is required for this driver")?;
    let transport = SerialTransport::open(port, 9600, SerialParity::Even)
        .map_err(|e| format!("failed to open {}: {}", port, e))?;

    let mut args = DeviceArgs::new();
    if cli.jtag {
        args.flags |= DeviceFlags::JTAG;
    }
    args.path = Some(port.to_string());

    let mut device =
        registry::open(info, transport, &args).map_err(|e| format!("open failed: {}", e))?;

    match cli.command {
        Command::ListDrivers => unreachable!(),
        Command::Read { addr, len } => {
            let mut buf = vec![0u8; len as usize];
            let mut got = 0;
            while got < buf.len() {
                let n = device
                    .readmem(Address::new(addr + got as u32), &mut buf[got..])
                    .map_err(|e| e.to_string())?;
                if n == 0 {
                    break;
                }
                got += n;
            }
            buf.truncate(got);
            println!("{}", hex::encode(&buf));
        }
        Command::Write { addr, hex } => {
            let data = hex::decode(hex.trim()).map_err(|e| e.to_string())?;
            let mut written = 0;
            while written < data.len() {
                let n = device
                    .writemem(Address::new(addr + written as u32), &data[written..])
                    .map_err(|e| e.to_string())?;
                if n == 0 {
                    return Err("writemem made no progress".into());
                }
                written += n;
            }
            println!("wrote {} bytes", written);
        }
        Command::EraseMain => {
            device
                .erase(EraseKind::Main, msp430_core::ADDRESS_NONE)
                .map_err(|e| e.to_string())?;
            println!("erased main flash");
        }
        Command::Regs => {
            device.ctl(CtlOp::Halt).map_err(|e| e.to_string())?;
            let regs = device.getregs().map_err(|e| e.to_string())?;
            for (i, r) in regs.iter().enumerate() {
                println!("R{:<2} = 0x{:06x}", i, r);
            }
        }
    }

    device.destroy();
    Ok(())
}
