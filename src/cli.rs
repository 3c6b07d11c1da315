use clap::{Arg, ArgAction, Command};
use log::debug;
use std::time::Instant;

pub fn build_cli() -> Command {
    debug!("⚙️ Building CLI interface...");
    let start_time = Instant::now();
    let cmd = Command::new("ipcamcorder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Records JPEG snapshot cameras into rolling, retention-bounded video segments.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML configuration file; command-line values win over it")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log per-frame timings and fps drops")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory for the video segments (default: current directory)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .value_name("HOURS")
                .help("Length of each segment in hours, 0 or less for a single endless segment (default: 24)")
                .value_parser(clap::value_parser!(f64))
                .allow_negative_numbers(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("cache")
                .long("cache")
                .value_name("N")
                .help("Number of segments to keep per channel (default: 5)")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FPS")
                .help("Frames per second to fetch and record (default: 1.0)")
                .value_parser(clap::value_parser!(f64))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("EXT")
                .help("Container extension of the segments (default: avi)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_name("NAME")
                .help("Media backend: opencv (default when built with the opencv feature) or native")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("channels")
                .value_name("NAME=URI")
                .help("Channels to record, e.g. front=http://192.168.1.20/img.jpg")
                .num_args(0..)
                .action(ArgAction::Append),
        );
    debug!("✅ CLI interface built in {:?}", start_time.elapsed());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_channel_tokens_and_flags() {
        let matches = build_cli()
            .try_get_matches_from(["ipcamcorder", "--fps", "2.5", "-v", "front=http://a/img.jpg", "back=http://b/img.jpg"])
            .unwrap();
        let channels: Vec<&String> = matches.get_many::<String>("channels").unwrap().collect();
        assert_eq!(channels, ["front=http://a/img.jpg", "back=http://b/img.jpg"]);
        assert_eq!(matches.get_one::<f64>("fps"), Some(&2.5));
        assert!(matches.get_flag("verbose"));
        assert_eq!(matches.get_one::<f64>("duration"), None);
    }

    #[test]
    fn test_negative_duration_accepted() {
        let matches = build_cli().try_get_matches_from(["ipcamcorder", "--duration", "-1"]).unwrap();
        assert_eq!(matches.get_one::<f64>("duration"), Some(&-1.0));
    }
}
