mod occlusion_scene;

use occlusion_scene::app;
use occlusion_scene::config::{cli_help, parse_cli_options};

fn main() -> anyhow::Result<()> {
    let options = parse_cli_options()?;
    if options.show_help {
        println!("{}", cli_help());
        return Ok(());
    }

    app::run(&options);
    Ok(())
}
