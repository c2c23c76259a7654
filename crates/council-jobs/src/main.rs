use owo_colors::OwoColorize as _;

fn main() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    .format_timestamp_millis()
    .try_init();

  match council_jobs::run() {
    Ok(code) => std::process::exit(code),
    Err(err) => {
      anstream::eprintln!("{}", format!("{err:#}").red());
      std::process::exit(council_jobs::error::exit_code_for(&err));
    }
  }
}
