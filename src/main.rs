use burn::backend::{Autodiff, NdArray};
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use standup::config::AppConfig;
use standup::rl::{ActorCriticConfig, Agent, StateExtractor, TrainConfig, adam};
use standup::sim::{ModelDescription, PlanarBody, Simulation};
use standup::task::{Checkpointer, Session, TaskController};

type Backend = Autodiff<NdArray<f32>>;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("standup=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::from_env();
    tracing::info!("Configuration: {:?}", config);

    let model = ModelDescription::from_file(&config.model_path)?;
    let body = PlanarBody::new(model);

    let obs_dim = StateExtractor::new(&body).obs_dim();
    let network = ActorCriticConfig::new(obs_dim, body.action_dim());
    let agent: Agent<Backend, _> =
        Agent::new(Default::default(), &network, TrainConfig::default(), adam::<Backend>());

    let task = TaskController::new(Checkpointer::new(&config.checkpoint_path));
    let mut session = Session::new(body, agent, task)
        .with_policy_dir(&config.policy_dir)
        .with_log_every(config.log_every);

    if config.load_on_start {
        session.load_checkpoint()?;
    }

    tracing::info!("Viewer enabled: {}", config.viewer);

    if config.viewer {
        #[cfg(feature = "viewer")]
        {
            standup::viewer::run_viewer(session);
            return Ok(());
        }
        #[cfg(not(feature = "viewer"))]
        tracing::warn!("Built without the `viewer` feature, running headless");
    }

    session.run(config.max_episodes)?;
    Ok(())
}
