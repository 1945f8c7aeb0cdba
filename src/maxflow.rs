//! # Max-flow / min-cut
//!
//! Dinic's algorithm over an adjacency list with integer capacities. Used by the expansion
//! move-maker to solve each binary move exactly.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use crate::cost::Cost;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct FlowGraph {
    adj: Vec<Vec<usize>>,
    to: Vec<usize>,
    cap: Vec<Cost>,
    level: Vec<i32>,
    iter: Vec<usize>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl FlowGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            adj: vec![Vec::new(); node_count],
            to: Vec::new(),
            cap: Vec::new(),
            level: vec![-1; node_count],
            iter: vec![0; node_count],
        }
    }

    /// Add an arc `u -> v` with capacity `cap` and a reverse arc with capacity `rev_cap`.
    pub fn add_edge(&mut self, u: usize, v: usize, cap: Cost, rev_cap: Cost) {
        debug_assert!(cap >= 0 && rev_cap >= 0);
        self.adj[u].push(self.to.len());
        self.to.push(v);
        self.cap.push(cap);
        self.adj[v].push(self.to.len());
        self.to.push(u);
        self.cap.push(rev_cap);
    }

    /// Push the maximum flow from `s` to `t` and return its value.
    pub fn max_flow(&mut self, s: usize, t: usize) -> Cost {
        let mut flow = 0;
        while self.bfs(s, t) {
            for it in self.iter.iter_mut() {
                *it = 0;
            }
            loop {
                let pushed = self.augment(s, t);
                if pushed == 0 {
                    break;
                }
                flow += pushed;
            }
        }
        flow
    }

    /// Nodes on the source side of the minimum cut. Only valid after `max_flow`.
    pub fn source_side(&self, s: usize) -> Vec<bool> {
        let mut seen = vec![false; self.adj.len()];
        let mut queue = VecDeque::new();
        seen[s] = true;
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for &e in self.adj[u].iter() {
                let v = self.to[e];
                if self.cap[e] > 0 && !seen[v] {
                    seen[v] = true;
                    queue.push_back(v);
                }
            }
        }
        seen
    }

    fn bfs(&mut self, s: usize, t: usize) -> bool {
        for l in self.level.iter_mut() {
            *l = -1;
        }
        let mut queue = VecDeque::new();
        self.level[s] = 0;
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for &e in self.adj[u].iter() {
                let v = self.to[e];
                if self.cap[e] > 0 && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        self.level[t] >= 0
    }

    /// Find one augmenting path in the level graph and saturate it. Iterative so that long
    /// paths do not grow the call stack.
    fn augment(&mut self, s: usize, t: usize) -> Cost {
        let mut path: Vec<usize> = Vec::new();
        let mut u = s;
        loop {
            if u == t {
                let pushed = path.iter().map(|&e| self.cap[e]).min().unwrap_or(0);
                for &e in path.iter() {
                    self.cap[e] -= pushed;
                    self.cap[e ^ 1] += pushed;
                }
                return pushed;
            }

            let mut advanced = false;
            while self.iter[u] < self.adj[u].len() {
                let e = self.adj[u][self.iter[u]];
                let v = self.to[e];
                if self.cap[e] > 0 && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.iter[u] += 1;
            }

            if !advanced {
                // Dead end, retreat and skip the arc that led here.
                self.level[u] = -1;
                match path.pop() {
                    Some(e) => {
                        u = self.to[e ^ 1];
                        self.iter[u] += 1;
                    }
                    None => return 0,
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_network() {
        // s=0, t=5
        let mut g = FlowGraph::new(6);
        g.add_edge(0, 1, 10, 0);
        g.add_edge(0, 2, 10, 0);
        g.add_edge(1, 2, 2, 0);
        g.add_edge(1, 3, 4, 0);
        g.add_edge(1, 4, 8, 0);
        g.add_edge(2, 4, 9, 0);
        g.add_edge(3, 5, 10, 0);
        g.add_edge(4, 3, 6, 0);
        g.add_edge(4, 5, 10, 0);
        assert_eq!(g.max_flow(0, 5), 19);

        let side = g.source_side(0);
        assert!(side[0]);
        assert!(!side[5]);
    }

    #[test]
    fn disconnected_sink() {
        let mut g = FlowGraph::new(3);
        g.add_edge(0, 1, 5, 0);
        assert_eq!(g.max_flow(0, 2), 0);
        assert_eq!(g.source_side(0), vec![true, true, false]);
    }
}
