//! Fork-scope overrides.
//!
//! By default [`Cx::fork`] attaches children to the forking fiber's own scope.
//! These combinators rebind that target for the duration of one future, with
//! the same push/pop discipline as interrupt status regions.
//!
//! [`Cx::transplant`] is the building block for combinators that fork helper
//! fibers from inside intermediate fibers: the [`Grafter`] it hands out wraps a
//! child body so that everything *that* body forks is supervised by the scope
//! captured at `transplant` time, not by the throwaway intermediate fiber.

use super::region::{LocalOverride, Region};
use super::Cx;
use crate::scope::Scope;
use std::future::Future;
use std::sync::Arc;

/// Reinstates the fork scope captured when a fork-scope mask was entered.
#[derive(Debug, Clone)]
pub struct ForkScopeRestore {
    scope: Option<Scope>,
}

impl ForkScopeRestore {
    /// Runs `fut` with the captured fork scope.
    pub fn run<F: Future>(&self, cx: &Cx, fut: F) -> impl Future<Output = F::Output> {
        cx.fork_scope_region(self.scope.clone(), fut)
    }
}

/// Attaches forks made by a wrapped body to a captured scope.
#[derive(Debug, Clone)]
pub struct Grafter {
    scope: Scope,
}

impl Grafter {
    /// The scope grafted bodies fork into.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Wraps an effect so that, wherever it runs, its forks go to the
    /// captured scope.
    pub fn graft<F, Fut>(&self, f: F) -> impl FnOnce(Cx) -> GraftedBody<Fut> + Send + 'static
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
    {
        let scope = self.scope.clone();
        move |cx: Cx| {
            let body = f(cx.clone());
            GraftedBody {
                region: cx.fork_scope_region(Some(scope), body),
            }
        }
    }
}

/// Future returned by a [grafted](Grafter::graft) effect.
#[must_use = "futures do nothing unless polled"]
pub struct GraftedBody<F> {
    region: Region<F>,
}

impl<F: Future> Future for GraftedBody<F> {
    type Output = F::Output;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        std::pin::Pin::new(&mut self.region).poll(cx)
    }
}

impl Cx {
    fn fork_scope_region<F>(&self, scope: Option<Scope>, fut: F) -> Region<F> {
        Region::new(
            Arc::clone(self.record()),
            LocalOverride::ForkScope(scope),
            fut,
        )
    }

    /// Runs `fut` with forks attached to `scope`.
    pub fn override_fork_scope<F: Future>(
        &self,
        scope: &Scope,
        fut: F,
    ) -> impl Future<Output = F::Output> {
        self.fork_scope_region(Some(scope.clone()), fut)
    }

    /// Runs `f(restore)` with forks attached to `scope`, where `restore`
    /// reinstates the fork scope in force when the mask was entered.
    pub fn fork_scope_mask<F, Fut>(&self, scope: &Scope, f: F) -> impl Future<Output = Fut::Output>
    where
        F: FnOnce(ForkScopeRestore) -> Fut,
        Fut: Future,
    {
        let restore = ForkScopeRestore {
            scope: self.record().with_state(|state| state.fork_scope.clone()),
        };
        self.fork_scope_region(Some(scope.clone()), f(restore))
    }

    /// Runs `f` with a [`Grafter`] bound to the current fork scope.
    pub fn transplant<F, Fut>(&self, f: F) -> Fut
    where
        F: FnOnce(Grafter) -> Fut,
        Fut: Future,
    {
        f(Grafter {
            scope: self.fork_scope(),
        })
    }

    /// Runs `fut` with the parallelism bound set to `n` (`None` is unbounded).
    pub fn with_parallelism<F: Future>(
        &self,
        n: Option<usize>,
        fut: F,
    ) -> impl Future<Output = F::Output> {
        Region::new(
            Arc::clone(self.record()),
            LocalOverride::Parallelism(n.map(|n| n.max(1))),
            fut,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::test_utils::init_test_logging;
    use crate::types::{Cause, Exit};
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn override_redirects_forks_and_restores() {
        init_test("override_redirects_forks_and_restores");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let custom = Scope::new();
            let probe = cx.clone();
            let inside = cx
                .override_fork_scope(&custom, async move { probe.fork_scope() })
                .await;
            Ok::<_, Cause<()>>((inside == custom, cx.fork_scope() == cx.scope()))
        });
        assert_eq!(exit, Exit::succeed((true, true)));
        crate::test_complete!("override_redirects_forks_and_restores");
    }

    #[test]
    fn fork_scope_mask_restores_outer_scope() {
        init_test("fork_scope_mask_restores_outer_scope");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let outer = Scope::new();
            let inner = Scope::new();
            let c = cx.clone();
            let inner_clone = inner.clone();
            let (masked, restored) = cx
                .override_fork_scope(&outer, async move {
                    let c2 = c.clone();
                    c.fork_scope_mask(&inner_clone, move |restore| async move {
                        let masked = c2.fork_scope();
                        let probe = c2.clone();
                        let restored = restore.run(&c2, async move { probe.fork_scope() }).await;
                        (masked, restored)
                    })
                    .await
                })
                .await;
            Ok::<_, Cause<()>>((masked == inner, restored == outer))
        });
        assert_eq!(exit, Exit::succeed((true, true)));
        crate::test_complete!("fork_scope_mask_restores_outer_scope");
    }

    #[test]
    fn grafted_forks_outlive_their_forker() {
        init_test("grafted_forks_outlive_their_forker");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let grandchild_exit = cx
                .transplant(|graft| {
                    let cx = cx.clone();
                    async move {
                        let middle = cx.fork(graft.graft(|cx: Cx| async move {
                            let grandchild = cx.fork(|cx: Cx| async move {
                                cx.sleep(Duration::from_millis(10)).await?;
                                Ok::<_, Cause<()>>(cx.now())
                            });
                            Ok::<_, Cause<()>>(grandchild)
                        }));
                        let grandchild = middle.join(&cx).await?;
                        Ok::<_, Cause<()>>(grandchild.await_exit(&cx).await?)
                    }
                })
                .await?;
            Ok::<_, Cause<()>>(grandchild_exit)
        });
        assert_eq!(
            exit,
            Exit::succeed(Exit::succeed(crate::types::Time::from_millis(10)))
        );
        crate::test_complete!("grafted_forks_outlive_their_forker");
    }

    #[test]
    fn parallelism_is_lexical_and_inherited() {
        init_test("parallelism_is_lexical_and_inherited");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let c = cx.clone();
            let child_bound = cx
                .with_parallelism(Some(3), async move {
                    let child = c.fork(|cx: Cx| async move { Ok::<_, Cause<()>>(cx.parallelism()) });
                    child.join(&c).await
                })
                .await?;
            Ok::<_, Cause<()>>((child_bound, cx.parallelism()))
        });
        assert_eq!(exit, Exit::succeed((Some(3), None)));
        crate::test_complete!("parallelism_is_lexical_and_inherited");
    }
}
