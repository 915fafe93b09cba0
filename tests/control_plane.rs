//! End-to-end control-plane scenarios: real HTTP on loopback, scripted
//! runtime, and manual ticks of the loop bodies for determinism.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use uuid::Uuid;

use stevedore::manager::{Manager, ManagerServer};
use stevedore::runtime::{AnyRuntime, FakeRuntime};
use stevedore::scheduler::AnyScheduler;
use stevedore::store::DbKind;
use stevedore::task::{PortMapping, State, Task, TaskEvent};
use stevedore::worker::{ErrResponse, Worker, WorkerServer};

/// Boot a worker with a fake runtime and serve its API on a random port.
async fn spawn_worker(fake: FakeRuntime) -> (Arc<Mutex<Worker>>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let worker = Arc::new(Mutex::new(
        Worker::new(&addr, DbKind::Memory, AnyRuntime::Fake(fake)).unwrap(),
    ));
    let app = WorkerServer::router(worker.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (worker, addr)
}

fn round_robin_manager(workers: Vec<String>) -> Manager {
    Manager::new(workers, AnyScheduler::from_name("roundrobin"), DbKind::Memory).unwrap()
}

fn running_event(task: Task) -> TaskEvent {
    TaskEvent::new(State::Running, task)
}

#[tokio::test]
async fn dispatch_execute_reconcile_happy_path() {
    let (worker, addr) = spawn_worker(FakeRuntime::with_container_id("c1")).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    let task = Task {
        name: "hello".to_string(),
        image: "strm/helloworld-http".to_string(),
        ..Task::default()
    };
    let task_id = task.id;
    manager.add_event(running_event(task));

    manager.send_work().await;
    assert_eq!(manager.task_worker_map.get(&task_id), Some(&addr));
    assert_eq!(manager.find_task(&task_id).unwrap().state, State::Scheduled);

    {
        let mut w = worker.lock().await;
        assert_eq!(w.queue.len(), 1);
        w.run_next_task().await.unwrap();
    }

    manager.update_tasks().await;
    let reconciled = manager.find_task(&task_id).unwrap();
    assert_eq!(reconciled.state, State::Running);
    assert_eq!(reconciled.container_id, "c1");
    assert!(reconciled.start_time.is_some());
}

#[tokio::test]
async fn stop_flow_converges_to_completed() {
    let (worker, addr) = spawn_worker(FakeRuntime::with_container_id("c1")).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    let task = Task {
        name: "short-lived".to_string(),
        image: "strm/helloworld-http".to_string(),
        ..Task::default()
    };
    let task_id = task.id;
    manager.add_event(running_event(task));
    manager.send_work().await;
    worker.lock().await.run_next_task().await.unwrap();
    manager.update_tasks().await;

    // Ask for completion; the dispatch loop turns it into a worker DELETE.
    let current = manager.find_task(&task_id).unwrap();
    manager.add_event(TaskEvent::new(State::Completed, current));
    manager.send_work().await;

    {
        let mut w = worker.lock().await;
        assert_eq!(w.queue.len(), 1);
        assert_eq!(w.queue[0].state, State::Completed);
        w.run_next_task().await.unwrap();
        let stored = w.find_task(&task_id).unwrap();
        assert_eq!(stored.state, State::Completed);
        assert!(stored.finish_time.is_some());
    }

    manager.update_tasks().await;
    assert_eq!(manager.find_task(&task_id).unwrap().state, State::Completed);
}

#[tokio::test]
async fn reconcile_preserves_manager_owned_fields() {
    let (worker, addr) = spawn_worker(FakeRuntime::with_container_id("c1")).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    // The manager knows things about the task the worker does not report
    // back, like its restart budget consumption.
    let mut task = Task {
        name: "sticky".to_string(),
        state: State::Scheduled,
        restart_count: 2,
        health_check: "/health".to_string(),
        ..Task::default()
    };
    manager.task_db.put(&task.id.to_string(), &task).unwrap();

    // The worker reports it running under a container id.
    task.state = State::Running;
    task.container_id = "c1".to_string();
    task.restart_count = 0;
    task.health_check = String::new();
    worker.lock().await.db.put(&task.id.to_string(), &task).unwrap();

    manager.update_tasks().await;
    let merged = manager.find_task(&task.id).unwrap();
    assert_eq!(merged.state, State::Running);
    assert_eq!(merged.container_id, "c1");
    assert_eq!(merged.restart_count, 2, "manager-owned field overwritten");
    assert_eq!(merged.health_check, "/health");
}

#[tokio::test]
async fn no_candidate_leaves_only_an_audit_record() {
    let mut manager = round_robin_manager(Vec::new());
    manager.add_event(running_event(Task::default()));

    manager.send_work().await;
    assert!(manager.pending.is_empty());
    assert_eq!(manager.event_db.count().unwrap(), 1);
    assert_eq!(manager.task_db.count().unwrap(), 0);
}

#[tokio::test]
async fn transport_failure_requeues_at_the_tail() {
    // Nothing listens on port 1; every POST fails in transport.
    let dead_worker = "127.0.0.1:1".to_string();
    let mut manager = round_robin_manager(vec![dead_worker]);

    let event = running_event(Task::default());
    let event_id = event.id;
    let task_id = event.task.id;
    manager.add_event(event);

    manager.send_work().await;
    assert_eq!(manager.pending.len(), 1);
    assert_eq!(manager.pending.back().unwrap().id, event_id);
    assert_eq!(manager.event_db.count().unwrap(), 1);
    // The failed placement was rolled back so the retry can reschedule.
    assert!(manager.task_worker_map.get(&task_id).is_none());
    assert!(manager.worker_task_map.values().all(|tasks| tasks.is_empty()));
    // The rotation slot was not consumed either.
    match &manager.scheduler {
        AnyScheduler::RoundRobin(rr) => assert_eq!(rr.last, None),
        _ => unreachable!(),
    }

    // A second iteration retries the same event and fails the same way.
    manager.send_work().await;
    assert_eq!(manager.pending.len(), 1);
    assert_eq!(manager.event_db.count().unwrap(), 1);
}

#[tokio::test]
async fn transport_failure_does_not_burn_a_rotation_slot() {
    let (_live_worker, live_addr) = spawn_worker(FakeRuntime::new()).await;
    let dead_addr = "127.0.0.1:1".to_string();
    let mut manager = round_robin_manager(vec![live_addr.clone(), dead_addr]);

    // First placement lands on the live worker at index 0.
    let first = Task::default();
    let first_id = first.id;
    manager.add_event(running_event(first));
    manager.send_work().await;
    assert_eq!(manager.task_worker_map.get(&first_id), Some(&live_addr));

    // The second placement rotates onto the dead worker and dies in
    // transport; the rotation must stay where the last committed dispatch
    // left it.
    let second = Task::default();
    let second_id = second.id;
    manager.add_event(running_event(second));
    manager.send_work().await;
    assert_eq!(manager.pending.len(), 1);
    assert!(manager.task_worker_map.get(&second_id).is_none());
    match &manager.scheduler {
        AnyScheduler::RoundRobin(rr) => assert_eq!(rr.last, Some(0)),
        _ => unreachable!(),
    }

    // The retry targets the same rotation slot instead of skipping back to
    // the live worker and double-placing on it.
    manager.send_work().await;
    assert_eq!(manager.pending.len(), 1);
    assert_eq!(manager.worker_task_map[&live_addr].len(), 1);
    match &manager.scheduler {
        AnyScheduler::RoundRobin(rr) => assert_eq!(rr.last, Some(0)),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn restart_cap_leaves_exhausted_tasks_alone() {
    let (worker, addr) = spawn_worker(FakeRuntime::new()).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    let task = Task {
        name: "exhausted".to_string(),
        state: State::Failed,
        restart_count: 3,
        ..Task::default()
    };
    manager.task_db.put(&task.id.to_string(), &task).unwrap();
    manager.task_worker_map.insert(task.id, addr.clone());
    manager
        .worker_task_map
        .entry(addr)
        .or_default()
        .push(task.id);

    manager.do_health_checks().await;

    let after = manager.find_task(&task.id).unwrap();
    assert_eq!(after.state, State::Failed);
    assert_eq!(after.restart_count, 3);
    assert!(worker.lock().await.queue.is_empty());
}

#[tokio::test]
async fn failing_health_check_restarts_on_the_same_worker() {
    let (worker, addr) = spawn_worker(FakeRuntime::new()).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    // A health endpoint that always reports trouble.
    let health_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let health_port = health_listener.local_addr().unwrap().port();
    let health_app =
        Router::new().route("/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    tokio::spawn(async move {
        axum::serve(health_listener, health_app).await.unwrap();
    });

    let task = Task {
        name: "unhealthy".to_string(),
        state: State::Running,
        container_id: "c1".to_string(),
        health_check: "/health".to_string(),
        exposed_ports: vec![PortMapping {
            container_port: 80,
            host_port: health_port,
            protocol: "tcp".to_string(),
        }],
        ..Task::default()
    };
    manager.task_db.put(&task.id.to_string(), &task).unwrap();
    manager.task_worker_map.insert(task.id, addr.clone());
    manager
        .worker_task_map
        .entry(addr.clone())
        .or_default()
        .push(task.id);

    manager.do_health_checks().await;

    let restarted = manager.find_task(&task.id).unwrap();
    assert_eq!(restarted.state, State::Scheduled);
    assert_eq!(restarted.restart_count, 1);

    // The restart event went straight to the owning worker.
    let w = worker.lock().await;
    assert_eq!(w.queue.len(), 1);
    assert_eq!(w.queue[0].id, task.id);
    assert_eq!(w.queue[0].state, State::Scheduled);
    assert_eq!(w.queue[0].restart_count, 1);
}

#[tokio::test]
async fn round_robin_spreads_placements_across_workers() {
    let mut workers = Vec::new();
    let mut addrs = Vec::new();
    for _ in 0..3 {
        let (worker, addr) = spawn_worker(FakeRuntime::new()).await;
        workers.push(worker);
        addrs.push(addr);
    }
    let mut manager = round_robin_manager(addrs.clone());

    for i in 0..6 {
        let task = Task {
            name: format!("task-{i}"),
            ..Task::default()
        };
        let task_id = task.id;
        manager.add_event(running_event(task));
        manager.send_work().await;
        assert_eq!(
            manager.task_worker_map.get(&task_id),
            Some(&addrs[i % 3]),
            "placement {i}"
        );
    }

    for addr in &addrs {
        assert_eq!(manager.worker_task_map[addr].len(), 2);
    }
}

#[tokio::test]
async fn manager_api_accepts_events_and_rejects_unknown_deletes() {
    let manager = Arc::new(Mutex::new(round_robin_manager(Vec::new())));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let app = ManagerServer::router(manager.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let event = running_event(Task {
        name: "api-task".to_string(),
        ..Task::default()
    });

    let resp = client
        .post(format!("http://{addr}/tasks"))
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let accepted: Task = resp.json().await.unwrap();
    assert_eq!(accepted.id, event.task.id);
    assert_eq!(manager.lock().await.pending.len(), 1);

    let resp = client
        .get(format!("http://{addr}/nodes"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .delete(format!("http://{addr}/tasks/{}", Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn worker_api_rejects_malformed_events_with_the_error_envelope() {
    let (_worker, addr) = spawn_worker(FakeRuntime::new()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/tasks"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let err: ErrResponse = resp.json().await.unwrap();
    assert_eq!(err.http_status_code, 400);
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn mapped_task_event_with_wrong_target_is_dropped() {
    let (worker, addr) = spawn_worker(FakeRuntime::with_container_id("c1")).await;
    let mut manager = round_robin_manager(vec![addr.clone()]);

    let task = Task {
        name: "mapped".to_string(),
        image: "strm/helloworld-http".to_string(),
        ..Task::default()
    };
    let task_id = task.id;
    manager.add_event(running_event(task));
    manager.send_work().await;
    worker.lock().await.run_next_task().await.unwrap();
    manager.update_tasks().await;

    // A second Running event for a task that already has a worker is
    // rejected at dispatch, leaving only the audit record.
    let current = manager.find_task(&task_id).unwrap();
    manager.add_event(TaskEvent::new(State::Running, current));
    manager.send_work().await;

    assert!(manager.pending.is_empty());
    assert_eq!(manager.event_db.count().unwrap(), 2);
    assert!(worker.lock().await.queue.is_empty());
    assert_eq!(manager.find_task(&task_id).unwrap().state, State::Running);
}
