#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use ice::{Agent, Role};
use ice::agent::{AgentEvent, AgentOptions};
use ice_agent::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let gather = ice::component::GatherOptions {
        use_local: config.ice.use_local,
        use_stun_bind: config.ice.use_stun_bind,
        use_stun_relay_udp: config.ice.use_stun_relay_udp,
    };

    let options = AgentOptions {
        role: Role::Initiator,
        gather,
        aggressive_nomination: config.ice.aggressive_nomination,
        max_pairs_per_component: config.ice.max_pairs_per_component,
        ..AgentOptions::default()
    };

    let (agent, mut events) = Agent::new(options);

    let turn_server = config.ice.server.map(|server| {
        (
            server,
            turn::allocation::Credentials {
                username: config.auth.username.clone(),
                password: config.auth.password.clone(),
            },
        )
    });

    agent
        .start(
            config.ice.component_count,
            &config.ice.local_addrs,
            config.ice.server,
            turn_server,
            gather,
        )
        .await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::CandidateGathered(candidate) => {
                    log::info!("candidate gathered: {:?}", candidate)
                }
                AgentEvent::GatheringComplete => log::info!("gathering complete"),
                AgentEvent::ComponentReady(id) => log::info!("component {id} ready"),
                AgentEvent::StateChanged(state) => log::info!("state changed: {:?}", state),
                AgentEvent::Failed(reason) => log::error!("agent failed: {reason}"),
            }
        }
    });

    agent.run().await?;
    Ok(())
}
