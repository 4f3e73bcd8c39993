//! Example: multi-task Bayesian agent over a sequence of colored gridworlds
//!
//! Tasks are drawn from two latent classes of reward weights. Run with
//! `RUST_LOG=hbrl_agent=info` to see the accepted class structure after each
//! task switch.

use hbrl_agent::{McmcConfig, MultiTaskBayesianAgent, MultiTaskConfig};
use hbrl_core::{Agent, Location, TaskDomain};
use hbrl_env::{ColorGrid, ColorGridConfig, ValueIteration};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let num_tasks = 6;
    let episodes_per_task = 3;
    let max_steps = 40;

    let config = MultiTaskConfig {
        num_colors: 2,
        steps_per_policy: 10,
        mcmc: McmcConfig {
            burn_in: 50,
            samples: 200,
            thin: 2,
        },
        seed: Some(2024),
        ..MultiTaskConfig::default()
    };
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(7);
    let grid_config = ColorGridConfig {
        width: 6,
        height: 6,
        num_colors: config.num_colors,
        goal: None,
    };
    let domains = (0..num_tasks)
        .map(|_| ColorGrid::random(&grid_config, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    // Two latent classes: one penalises color 0, the other color 1
    let dim = config.weights_size();
    let class_means = [
        DVector::from_fn(dim, |i, _| if i % 2 == 0 { -3.0 } else { -0.5 }),
        DVector::from_fn(dim, |i, _| if i % 2 == 0 { -0.5 } else { -3.0 }),
    ];
    let task_weights: Vec<DVector<f64>> = (0..num_tasks)
        .map(|t| class_means[t % 2].map(|w| w + rng.gen_range(-0.2..0.2)))
        .collect();

    let stdev = config.reward_stdev;
    let mut agent = MultiTaskBayesianAgent::new(config, domains.clone(), ValueIteration::default())?;

    for (task, domain) in domains.iter().enumerate() {
        for episode in 0..episodes_per_task {
            let mut location = Location::new(0, 0);
            agent.episode_starting(task, location, domain.cell_features(location))?;
            let mut total_reward = 0.0;
            let mut steps = 0;

            while steps < max_steps && !domain.is_goal(location) {
                let action = agent.get_action(task)?;
                location = domain.step(location, action);
                let reward = domain.sample_reward(&task_weights[task], location, stdev, &mut rng)?;
                agent.observe_reward(task, reward)?;
                agent.set_state(task, location, domain.cell_features(location))?;
                total_reward += reward;
                steps += 1;
            }
            agent.episode_over(task)?;

            println!(
                "Task {} Episode {}: Total Reward = {:.2}, Steps = {}, Reached Goal = {}",
                task,
                episode + 1,
                total_reward,
                steps,
                domain.is_goal(location)
            );
        }
    }

    // Print statistics
    let metrics = agent.metrics();
    println!(
        "\nEpisodes: {}, Steps: {}, Belief Updates: {}, Policy Updates: {}",
        metrics.total_episodes, metrics.total_steps, metrics.belief_updates, metrics.policy_updates
    );
    println!("Average Reward per Episode: {:.2}", metrics.avg_episode_reward);
    println!("Task Assignments: {:?}", agent.engine().belief().assignments());

    Ok(())
}
