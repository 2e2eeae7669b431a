use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("plexwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: plexwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PLEXWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "frame_types: open={}, data={}/{}, end={}/{}, error={}/{}",
        plexwire_frame::FrameType::OPEN,
        plexwire_frame::FrameType::LOCAL_DATA,
        plexwire_frame::FrameType::REMOTE_DATA,
        plexwire_frame::FrameType::LOCAL_END,
        plexwire_frame::FrameType::REMOTE_END,
        plexwire_frame::FrameType::LOCAL_ERROR,
        plexwire_frame::FrameType::REMOTE_ERROR,
    );
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
