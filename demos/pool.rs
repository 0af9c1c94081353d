use std::io::Read;

use log::{Level, LevelFilter, Log, Metadata, Record};
use nextfit::{
  Pool,
  region::{program_break, sbrk_region},
};

struct Logger;

impl Log for Logger {
  fn enabled(
    &self,
    _metadata: &Metadata,
  ) -> bool {
    true
  }

  fn log(
    &self,
    record: &Record,
  ) {
    let color = match record.level() {
      Level::Error => 31, // Red
      Level::Warn => 93,  // BrightYellow
      Level::Info => 37,  // White
      Level::Debug => 32, // Green
      Level::Trace => 90, // BrightBlack
    };
    println!("\u{1B}[{}m[{}] {}\u{1B}[0m", color, record.level(), record.args());
  }

  fn flush(&self) {}
}

/// Waits until the user presses ENTER, to leave time for `pmap` or `gdb`.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  static LOGGER: Logger = Logger;
  if let Err(err) = log::set_logger(&LOGGER) {
    eprintln!("Error initializing logger: {err:?}");
  }
  log::set_max_level(LevelFilter::Trace);

  println!("[start] PID = {}, program break = {:?}", std::process::id(), program_break());

  // The pool takes 4 KiB from the program break once and keeps it.
  let Some(memory) = (unsafe { sbrk_region(4096) }) else {
    eprintln!("could not move the program break");
    return;
  };
  println!("[start] program break after reserving the pool = {:?}", program_break());

  let mut pool = Pool::new(memory);

  // --------------------------------------------------------------------
  // 1) Allocate four blocks; the list grows by splitting the free tail.
  // --------------------------------------------------------------------
  let sizes = [200, 100, 300, 400];
  let mut blocks = Vec::new();
  for size in sizes {
    match pool.allocate(size) {
      Ok(address) => {
        unsafe { address.as_ptr().write_bytes(0xAB, size) };
        println!("[1] allocated {size} bytes at {address:?}");
        blocks.push(address);
      }
      Err(err) => println!("[1] allocating {size} bytes failed: {err}"),
    }
  }
  print!("{}", pool.dump());

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release the first and third block. They stay as separate holes
  //    because the live blocks between them keep them apart.
  // --------------------------------------------------------------------
  for address in blocks.iter().step_by(2) {
    if let Err(err) = pool.release(address.as_ptr()) {
      println!("[2] release of {address:?} failed: {err}");
    }
  }
  print!("{}", pool.dump());

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Next-fit: releasing moved the cursor to the last freed hole, so the
  //    next request is served there rather than from the lowest hole.
  // --------------------------------------------------------------------
  if let Ok(address) = pool.allocate(250) {
    println!("[3] allocated 250 bytes at {address:?}");
  }
  print!("{}", pool.dump());
  println!("[3] {:?}", pool.stats());

  // --------------------------------------------------------------------
  // 4) Releasing the same block twice is refused.
  // --------------------------------------------------------------------
  if let Some(address) = blocks.first() {
    println!("[4] second release: {:?}", pool.release(address.as_ptr()));
  }

  match pool.verify() {
    Ok(()) => println!("\n[5] block list is consistent."),
    Err(err) => println!("\n[5] block list is damaged: {err}"),
  }
}
