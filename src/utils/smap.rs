use std::convert::Infallible;

fn infallible<T>(r: Result<T, Infallible>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => match e {},
    }
}

// Shallow map over the immediate children of type T of a node, threading an accumulator from left
// to right. Passes use this to rebuild a tree bottom-up without spelling out every variant.
pub trait SMapAccum<T> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> where Self: Sized;

    fn smap_accum_l<A>(self, acc: A, f: impl Fn(A, T) -> (A, T)) -> (A, Self) where Self: Sized {
        infallible(self.smap_accum_l_result(Ok(acc), |acc, t| Ok::<(A, T), Infallible>(f(acc, t))))
    }

    fn smap_result<E>(
        self,
        f: impl Fn(T) -> Result<T, E>
    ) -> Result<Self, E> where Self: Sized {
        let (_, t) = self.smap_accum_l_result(Ok(()), |_, t| Ok(((), f(t)?)))?;
        Ok(t)
    }

    fn smap(self, f: impl Fn(T) -> T) -> Self where Self: Sized {
        let (_, res) = self.smap_accum_l::<()>((), |_, x| ((), f(x)));
        res
    }
}

// Shallow fold over references to the immediate children of type T of a node.
pub trait SFold<T> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E>;

    fn sfold<A>(&self, acc: A, f: impl Fn(A, &T) -> A) -> A {
        infallible(self.sfold_result(Ok(acc), |acc, t| Ok::<A, Infallible>(f(acc, t))))
    }
}

impl<T> SMapAccum<T> for Vec<T> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> {
        self.into_iter()
            .fold(Ok((acc?, vec![])), |acc, x| {
                let (acc, mut elems) = acc?;
                let (acc, x) = f(acc, x)?;
                elems.push(x);
                Ok((acc, elems))
            })
    }
}

impl<T, K> SMapAccum<T> for Vec<(T, K)> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>,
    ) -> Result<(A, Self), E> {
        self.into_iter()
            .fold(Ok((acc?, vec![])), |acc, (v, k)| {
                let (acc, mut elems) = acc?;
                let (acc, v) = f(acc, v)?;
                elems.push((v, k));
                Ok((acc, elems))
            })
    }
}

impl<T> SMapAccum<T> for Option<Box<T>> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> {
        match self {
            Some(e) => {
                let (acc, e) = f(acc?, *e)?;
                Ok((acc, Some(Box::new(e))))
            },
            None => Ok((acc?, None))
        }
    }
}

impl<T> SFold<T> for Vec<T> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E> {
        self.iter().fold(acc, |acc, t| f(acc?, t))
    }
}

impl<T, K> SFold<T> for Vec<(T, K)> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E> {
        self.iter().fold(acc, |acc, (t, _)| f(acc?, t))
    }
}

impl<T> SFold<T> for Option<Box<T>> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Some(e) => f(acc?, e),
            None => acc
        }
    }
}
