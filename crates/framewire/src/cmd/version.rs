use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framewire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framewire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("FRAMEWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("FRAMEWIRE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: channel={}, async={}, cli=true",
        cfg!(feature = "channel"),
        cfg!(feature = "async")
    );
    println!(
        "frame: max_payload={} max_control_payload={}",
        framewire_frame::DEFAULT_MAX_PAYLOAD,
        framewire_frame::MAX_CONTROL_PAYLOAD
    );

    Ok(SUCCESS)
}
