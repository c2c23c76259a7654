use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::process::Child;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, unbounded};

const CHUNK_SIZE: usize = 8192;

fn spawn_pump<R>(mut reader: R, tx: Sender<Vec<u8>>) -> JoinHandle<()>
where
  R: Read + Send + 'static,
{
  std::thread::spawn(move || {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
      match reader.read(&mut buf) {
        Ok(0) => break,
        Ok(n) => {
          if tx.send(buf[..n].to_vec()).is_err() {
            break;
          }
        }
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
        Err(_) => break,
      }
    }
  })
}

/// Drain the child's stdout and stderr into `output`, echoing every chunk to `echo`.
///
/// Both pipes feed one channel so a single writer appends to the capture file
/// and chunks from the two streams interleave in arrival order. Echo failures
/// are ignored: nobody may be attached. Returns once both pipes hit EOF and
/// the capture is synced to disk.
///
/// # Errors
/// Returns an error if the capture file cannot be opened or written.
pub fn tee_child_output(child: &mut Child, output: &Path, echo: &mut dyn Write) -> Result<u64> {
  let mut file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(output)
    .with_context(|| format!("failed to open {}", output.display()))?;

  let (tx, rx) = unbounded::<Vec<u8>>();
  let mut pumps = Vec::new();
  if let Some(out) = child.stdout.take() {
    pumps.push(spawn_pump(out, tx.clone()));
  }
  if let Some(err) = child.stderr.take() {
    pumps.push(spawn_pump(err, tx.clone()));
  }
  drop(tx);

  let mut total = 0u64;
  for chunk in rx {
    file
      .write_all(&chunk)
      .with_context(|| format!("failed to append to {}", output.display()))?;
    let _ = echo.write_all(&chunk);
    let _ = echo.flush();
    total += chunk.len() as u64;
  }
  for pump in pumps {
    let _ = pump.join();
  }
  file.flush()?;
  file.sync_all()?;
  Ok(total)
}

/// Append a line written by the wrapper itself, e.g. when the payload cannot start.
///
/// # Errors
/// Returns an error if the capture file cannot be opened or written.
pub fn append_line(output: &Path, line: &str) -> Result<()> {
  let mut file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(output)
    .with_context(|| format!("failed to open {}", output.display()))?;
  writeln!(file, "{line}")?;
  file.sync_all()?;
  Ok(())
}
