use clap::Parser;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Debug a Linux process with GDB over the Remote Serial Protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on. 0 picks a free one.
    #[arg(long, short, default_value_t = 0, env = "GDBPROXY_PORT")]
    port: u16,

    /// Only listen; do not launch gdb.
    #[arg(long)]
    no_start: bool,

    /// Attach to a running process instead of starting one.
    #[arg(long, conflicts_with = "program")]
    attach: Option<usize>,

    /// Program to debug, followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required_unless_present = "attach")]
    program: Vec<String>,
}

#[cfg(all(target_os = "linux", target_arch = "x86_64", feature = "native"))]
fn run(args: Args) -> DynResult<()> {
    use std::net::TcpListener;
    use std::process::Command;
    use std::time::Duration;

    use gdbproxy::common::Pid;
    use gdbproxy::native::NativeTarget;
    use gdbproxy::server::{DisconnectReason, GdbServer};
    use gdbproxy::session::{pump, DebugSession};

    let mut target = match (args.attach, args.program.split_first()) {
        (Some(pid), _) => {
            let pid = Pid::new(pid).ok_or("pid must not be 0")?;
            NativeTarget::attach(pid)?
        }
        (None, Some((program, rest))) => NativeTarget::spawn(program, rest)?,
        (None, None) => return Err("nothing to debug".into()),
    };
    let mut session = DebugSession::new();
    pump::wait_for_first_stop(&mut target, &mut session, Duration::from_millis(100))?;

    let sock = TcpListener::bind(("127.0.0.1", args.port))?;
    let addr = sock.local_addr()?;
    eprintln!("Debugging process {}, listening on {}", target.pid(), addr);

    if !args.no_start {
        // never waited on; the target ignores children it does not trace
        Command::new("gdb")
            .arg("-ex")
            .arg(format!("target remote {}", addr))
            .spawn()
            .map_err(|e| format!("cannot start gdb: {}", e))?;
    }

    let (stream, peer) = sock.accept()?;
    eprintln!("Debugger connected from {}", peer);

    match GdbServer::new(stream).run(&mut target, &mut session)? {
        DisconnectReason::TargetExited(code) => println!("Target exited with code {}!", code),
        DisconnectReason::TargetTerminated(sig) => {
            println!("Target terminated with signal {}!", sig)
        }
        DisconnectReason::Disconnect => println!("GDB Disconnected"),
        DisconnectReason::Kill => println!("GDB sent a kill command!"),
        DisconnectReason::ControllerHangup => println!("GDB went away, target killed"),
    }
    Ok(())
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64", feature = "native")))]
fn run(_args: Args) -> DynResult<()> {
    Err("no native debugging support for this host".into())
}

fn main() {
    pretty_env_logger::init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("gdbproxy: {}", e);
        std::process::exit(1);
    }
}
