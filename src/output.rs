use std::io::{self, Write};

use serde::Serialize;

/// Pretty-printed JSON on stdout, one document per call.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()
    }
}
