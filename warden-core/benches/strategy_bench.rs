use std::hint::black_box;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;

use warden_core::node::StatisticNode;
use warden_core::rules::Grade;
use warden_core::shapers::DefaultController;
use warden_core::shapers::FlowController;
use warden_core::shapers::RateLimiterController;
use warden_core::shapers::WarmUpController;

fn bench_single_threaded(group_name: &str, c: &mut Criterion, controller: Arc<dyn FlowController>, node: Arc<StatisticNode>) {
    let mut group = c.benchmark_group(group_name);
    group.bench_function("single-threaded", |b| {
        b.iter(|| {
            let _ = black_box(controller.as_ref()).can_pass(&node, 0, 1, false);
        })
    });
    group.finish();
}

fn bench_parallel(group_name: &str, c: &mut Criterion, controller: Arc<dyn FlowController>, node: Arc<StatisticNode>) {
    let mut group = c.benchmark_group(group_name);

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(BenchmarkId::from_parameter(format!("{num_threads}-threads")), &num_threads, |b, &n| {
            b.iter_custom(|iters| {
                let barrier = Arc::new(Barrier::new(n + 1));
                let mut handles = Vec::with_capacity(n);

                for _ in 0..n {
                    let controller = controller.clone();
                    let node = node.clone();
                    let bar = barrier.clone();
                    let iters_per_thread = iters / n as u64;

                    handles.push(thread::spawn(move || {
                        bar.wait();
                        for _ in 0..iters_per_thread {
                            let _ = black_box(controller.can_pass(&node, 0, 1, false));
                        }
                    }));
                }

                barrier.wait();
                let start = Instant::now();
                for handle in handles {
                    let _ = handle.join();
                }
                start.elapsed()
            });
        });
    }
    group.finish();
}

fn run_all_benches(c: &mut Criterion) {
    let default_ctrl: Arc<dyn FlowController> = Arc::new(DefaultController::new(Grade::Qps, 1_000_000.0, 0));
    let rate_limiter_ctrl: Arc<dyn FlowController> = Arc::new(RateLimiterController::new(1_000_000.0, 5000));
    let warm_up_ctrl: Arc<dyn FlowController> = Arc::new(WarmUpController::new(1_000_000.0, 10, 3.0));

    bench_single_threaded("DefaultController", c, default_ctrl.clone(), Arc::new(StatisticNode::new()));
    bench_parallel("DefaultController", c, default_ctrl, Arc::new(StatisticNode::new()));

    bench_single_threaded("RateLimiterController", c, rate_limiter_ctrl.clone(), Arc::new(StatisticNode::new()));
    bench_parallel("RateLimiterController", c, rate_limiter_ctrl, Arc::new(StatisticNode::new()));

    bench_single_threaded("WarmUpController", c, warm_up_ctrl.clone(), Arc::new(StatisticNode::new()));
    bench_parallel("WarmUpController", c, warm_up_ctrl, Arc::new(StatisticNode::new()));
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
