mod io;
mod repl;

pub use io::UserInput;
pub use repl::{Command, Repl, parse_temperature};
