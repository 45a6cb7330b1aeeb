// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded task execution: pool and sequence.

use std::cell::RefCell;
use std::rc::Rc;
use weft_error::WeftError;
use weft_promise::{Deferred, Promise};

/// A unit of deferred work: invoked at launch time, yields the promise to
/// watch.
pub type Task<T> = Box<dyn FnOnce() -> Promise<T>>;

struct PoolState<T> {
    tasks: Vec<Option<Task<T>>>,
    next: usize,
    in_flight: usize,
    completed: usize,
    results: Vec<Option<T>>,
    pumping: bool,
}

/// Run `tasks` with at most `concurrency` in flight; as each settles, the
/// next launches. Fulfils with all results in task order.
///
/// The first rejection settles the pool's promise; tasks already in flight
/// keep running but their results are discarded, and no further tasks are
/// launched.
///
/// # Errors
///
/// `InvalidArgument` when `concurrency` is zero, synchronously.
pub fn pool<T: Clone + 'static>(
    tasks: Vec<Task<T>>,
    concurrency: usize,
) -> Result<Promise<Vec<T>>, WeftError> {
    if concurrency == 0 {
        return Err(WeftError::invalid_argument(
            "pool concurrency must be greater than zero",
        ));
    }
    Ok(run_pool(tasks, concurrency))
}

/// Run `tasks` one at a time, in order. The first rejection short-circuits:
/// no later task is launched.
pub fn sequence<T: Clone + 'static>(tasks: Vec<Task<T>>) -> Promise<Vec<T>> {
    run_pool(tasks, 1)
}

fn run_pool<T: Clone + 'static>(tasks: Vec<Task<T>>, concurrency: usize) -> Promise<Vec<T>> {
    let total = tasks.len();
    if total == 0 {
        return Promise::resolved(Vec::new());
    }
    tracing::debug!(target: "weft.pool", total, concurrency, "pool started");
    let deferred = Deferred::new();
    let state = Rc::new(RefCell::new(PoolState {
        tasks: tasks.into_iter().map(Some).collect(),
        next: 0,
        in_flight: 0,
        completed: 0,
        results: vec![None; total],
        pumping: false,
    }));
    pump(&state, &deferred, concurrency);
    deferred.promise()
}

/// Launch tasks until the concurrency limit or the task list is exhausted.
///
/// Re-entrant calls (a task settling synchronously during launch) fall
/// through to the already-running pump loop instead of recursing.
fn pump<T: Clone + 'static>(
    state: &Rc<RefCell<PoolState<T>>>,
    deferred: &Deferred<Vec<T>>,
    concurrency: usize,
) {
    {
        let mut st = state.borrow_mut();
        if st.pumping {
            return;
        }
        st.pumping = true;
    }
    loop {
        // Once the pool promise settled (first rejection), stop launching.
        if deferred.promise().is_settled() {
            break;
        }
        let slot = {
            let mut st = state.borrow_mut();
            if st.in_flight >= concurrency || st.next >= st.tasks.len() {
                None
            } else {
                let index = st.next;
                st.next += 1;
                st.in_flight += 1;
                st.tasks[index].take().map(|task| (index, task))
            }
        };
        let Some((index, task)) = slot else {
            break;
        };
        let promise = task();
        let state = Rc::clone(state);
        let deferred = deferred.clone();
        promise.on_settled(move |outcome| {
            {
                let mut st = state.borrow_mut();
                st.in_flight -= 1;
                st.completed += 1;
            }
            match outcome {
                Err(reason) => {
                    let _ = deferred.reject(reason);
                }
                Ok(value) => {
                    let done = {
                        let mut st = state.borrow_mut();
                        st.results[index] = Some(value);
                        st.completed == st.tasks.len()
                    };
                    if done {
                        let values: Vec<T> =
                            state.borrow_mut().results.drain(..).flatten().collect();
                        let _ = deferred.resolve(values);
                    } else {
                        pump(&state, &deferred, concurrency);
                    }
                }
            }
        });
    }
    state.borrow_mut().pumping = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use weft_error::ErrorKind;
    use weft_loop::{delay_value, reset, run};

    fn immediate<T: Clone + 'static>(value: T) -> Task<T> {
        Box::new(move || Promise::resolved(value))
    }

    #[test]
    fn zero_concurrency_is_invalid_argument() {
        let err = pool(vec![immediate(1)], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_pool_fulfils_empty() {
        let p = pool(Vec::<Task<i32>>::new(), 4).unwrap();
        assert_eq!(p.value().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn pool_of_immediate_tasks_keeps_order() {
        let tasks: Vec<Task<i32>> = (0..20).map(immediate).collect();
        let p = pool(tasks, 3).unwrap();
        assert_eq!(p.value().unwrap(), (0..20).collect::<Vec<i32>>());
    }

    #[test]
    fn pool_respects_concurrency_limit() {
        reset();
        let active = Rc::new(Cell::new(0usize));
        let peak = Rc::new(Cell::new(0usize));
        let tasks: Vec<Task<u32>> = (0..8)
            .map(|i| {
                let active = Rc::clone(&active);
                let peak = Rc::clone(&peak);
                let task: Task<u32> = Box::new(move || {
                    active.set(active.get() + 1);
                    peak.set(peak.get().max(active.get()));
                    let active = Rc::clone(&active);
                    delay_value(3, i).finally(move || active.set(active.get() - 1))
                });
                task
            })
            .collect();
        let p = pool(tasks, 2).unwrap();
        run();
        assert_eq!(p.value().unwrap(), (0..8).collect::<Vec<u32>>());
        assert_eq!(peak.get(), 2);
    }

    #[test]
    fn pool_rejects_on_first_failure_and_stops_launching() {
        reset();
        let launched = Rc::new(Cell::new(0usize));
        let tasks: Vec<Task<u32>> = (0..6)
            .map(|i| {
                let launched = Rc::clone(&launched);
                let task: Task<u32> = Box::new(move || {
                    launched.set(launched.get() + 1);
                    if i == 1 {
                        Promise::rejected(WeftError::failed("task 1 failed"))
                    } else {
                        delay_value(2, i)
                    }
                });
                task
            })
            .collect();
        let p = pool(tasks, 2).unwrap();
        run();
        assert_eq!(p.rejection().unwrap(), WeftError::failed("task 1 failed"));
        // Tasks 0 and 1 launched; the rejection stopped the rest.
        assert_eq!(launched.get(), 2);
    }

    #[test]
    fn in_flight_tasks_finish_after_pool_rejects() {
        reset();
        let finished = Rc::new(Cell::new(false));
        let finished2 = Rc::clone(&finished);
        let tasks: Vec<Task<u32>> = vec![
            Box::new(move || delay_value(5, 0).finally(move || finished2.set(true))),
            Box::new(|| Promise::rejected(WeftError::failed("fast fail"))),
        ];
        let p = pool(tasks, 2).unwrap();
        run();
        assert!(p.is_rejected());
        // The slow in-flight task still ran to completion; its result was
        // simply discarded.
        assert!(finished.get());
    }

    #[test]
    fn sequence_runs_one_at_a_time_in_order() {
        reset();
        let order: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let tasks: Vec<Task<u32>> = (0..4)
            .map(|i| {
                let order = Rc::clone(&order);
                let task: Task<u32> = Box::new(move || {
                    order.borrow_mut().push(i);
                    delay_value(1, i)
                });
                task
            })
            .collect();
        let p = sequence(tasks);
        run();
        assert_eq!(p.value().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn sequence_short_circuits_on_rejection() {
        let launched = Rc::new(Cell::new(0usize));
        let tasks: Vec<Task<u32>> = (0..5)
            .map(|i| {
                let launched = Rc::clone(&launched);
                let task: Task<u32> = Box::new(move || {
                    launched.set(launched.get() + 1);
                    if i == 2 {
                        Promise::rejected(WeftError::failed("stop here"))
                    } else {
                        Promise::resolved(i)
                    }
                });
                task
            })
            .collect();
        let p = sequence(tasks);
        assert_eq!(p.rejection().unwrap(), WeftError::failed("stop here"));
        assert_eq!(launched.get(), 3);
    }
}
