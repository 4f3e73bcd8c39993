//! End-to-end inference scenarios

use hbrl_agent::{
    ClassModel, LinearGaussianRewardModel, McmcConfig, MultiTaskBayesianAgent, MultiTaskConfig,
};
use hbrl_core::{Agent, Location, TaskDomain};
use hbrl_env::{ColorGrid, ColorGridConfig, ValueIteration};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const SAMPLE_SIZE: usize = 1000;
const UPDATE_EVERY: usize = 100;
const TOLERANCE: f64 = 0.5;

fn true_mean() -> DVector<f64> {
    DVector::from_vec(vec![-1.0, -2.0, -0.5, -3.0, -1.5, -0.25, -2.5, -1.0, -0.75, -2.0])
}

fn config() -> MultiTaskConfig {
    MultiTaskConfig {
        num_colors: 2,
        reward_stdev: 0.3,
        mcmc: McmcConfig {
            burn_in: 20,
            samples: 80,
            thin: 1,
        },
        ..MultiTaskConfig::default()
    }
}

/// Distance between the accepted weights and the true mean after feeding
/// `SAMPLE_SIZE` one-hot observations
fn converged_distance(seed: u64) -> f64 {
    let config = config();
    let dim = config.weights_size();
    let mut rng = StdRng::seed_from_u64(seed);
    let truth = ClassModel::new(0, true_mean(), DMatrix::identity(dim, dim) * 1e-4).unwrap();
    let mut model = LinearGaussianRewardModel::new(
        &config,
        vec![truth.clone()],
        vec![1.0],
        config.base_distribution().unwrap(),
        &mut rng,
    )
    .unwrap();

    let noise = Normal::new(0.0, config.reward_stdev).unwrap();
    for s in 0..SAMPLE_SIZE {
        let mut state = DVector::zeros(dim);
        state[rng.gen_range(0..dim)] = 1.0;
        let reward = truth.mean().dot(&state) + noise.sample(&mut rng);
        model.add_observation(state, reward).unwrap();
        if (s + 1) % UPDATE_EVERY == 0 {
            model.update_beliefs(&mut rng).unwrap();
        }
    }
    (model.weights() - truth.mean()).norm()
}

#[test]
fn test_reward_model_converges_to_true_class() {
    let distances: Vec<f64> = (0..6).map(converged_distance).collect();
    let converged = distances.iter().filter(|&&d| d < TOLERANCE).count();
    assert!(converged >= 4, "distances {distances:?}");
}

#[test]
fn test_agent_runs_across_gridworld_tasks() {
    let mut rng = StdRng::seed_from_u64(99);
    let grid_config = ColorGridConfig {
        width: 4,
        height: 4,
        num_colors: 2,
        goal: None,
    };
    let domains: Vec<ColorGrid> = (0..3)
        .map(|_| ColorGrid::random(&grid_config, &mut rng).unwrap())
        .collect();
    let weights: Vec<DVector<f64>> = (0..3)
        .map(|t| DVector::from_element(10, -1.0 - t as f64 * 0.5))
        .collect();

    let config = MultiTaskConfig {
        num_colors: 2,
        steps_per_policy: 5,
        mcmc: McmcConfig {
            burn_in: 10,
            samples: 40,
            thin: 2,
        },
        seed: Some(7),
        ..MultiTaskConfig::default()
    };
    let stdev = config.reward_stdev;
    let mut agent =
        MultiTaskBayesianAgent::new(config, domains.clone(), ValueIteration::default()).unwrap();

    for &task in &[0usize, 1, 2, 0] {
        let domain = &domains[task];
        let mut location = Location::new(0, 0);
        agent
            .episode_starting(task, location, domain.cell_features(location))
            .unwrap();
        for _ in 0..30 {
            let action = agent.get_action(task).unwrap();
            location = domain.step(location, action);
            let reward = domain
                .sample_reward(&weights[task], location, stdev, &mut rng)
                .unwrap();
            agent.observe_reward(task, reward).unwrap();
            agent
                .set_state(task, location, domain.cell_features(location))
                .unwrap();
            if domain.is_goal(location) {
                break;
            }
        }
        agent.episode_over(task).unwrap();
    }

    let metrics = agent.metrics();
    assert_eq!(metrics.total_episodes, 4);
    assert_eq!(metrics.belief_updates, 3);
    assert!(metrics.policy_updates >= 3);
    assert!(metrics.avg_episode_reward < 0.0);
    assert_eq!(agent.engine().belief().num_tasks(), 3);
    agent.engine().belief().validate().unwrap();
    assert!(agent.policy().is_some());
    assert_eq!(agent.model().observations().len(), agent.history(0).unwrap().len());
}
